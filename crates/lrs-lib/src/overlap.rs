//! Overlap predicate for measure intervals on the same route

/// Whether the interval `[from_a, to_a]` overlaps the existing interval `[from_b, to_b]`
///
/// Both intervals are expected in ascending measure order. Touching at a single boundary is
/// allowed, and so is a gap of exactly `tolerance`.
///
/// # Arguments
/// * `from_a`, `to_a` - The new interval
/// * `from_b`, `to_b` - The existing interval
/// * `tolerance` - Project tolerance
pub fn overlaps(from_a: f64, from_b: f64, to_a: f64, to_b: f64, tolerance: f64) -> bool {
    // Trailing into the existing interval
    if to_a - from_b >= tolerance && to_a < to_b {
        return true;
    }
    // Leading into the existing interval
    if to_b - from_a >= tolerance && from_a > from_b {
        return true;
    }
    // Containing the existing interval
    if from_b - from_a >= tolerance && to_a - to_b >= tolerance {
        return true;
    }
    // Inside the existing interval
    if from_a - from_b >= tolerance && to_b - to_a >= tolerance {
        return true;
    }
    // Near-exact duplicate
    if (from_a - from_b).abs() <= tolerance && (to_a - to_b).abs() <= tolerance {
        return true;
    }
    // Shared start, longer end
    if (from_a - from_b).abs() <= tolerance && tolerance <= to_a - to_b {
        return true;
    }
    // Earlier start, shared end
    if from_b - from_a >= tolerance && tolerance >= (to_a - to_b).abs() {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_boundary() {
        assert!(overlaps(0.0, 9.0, 10.0, 20.0, 1.0));
        assert!(!overlaps(0.0, 11.0, 10.0, 20.0, 1.0));
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        // New interval ends where the existing one starts
        assert!(!overlaps(0.0, 10.0, 10.0, 20.0, 0.5));
        // New interval starts where the existing one ends
        assert!(!overlaps(20.0, 10.0, 30.0, 20.0, 0.5));
    }

    #[test]
    fn test_partial_overlaps() {
        assert!(overlaps(5.0, 10.0, 15.0, 20.0, 0.5));
        assert!(overlaps(15.0, 10.0, 25.0, 20.0, 0.5));
    }

    #[test]
    fn test_containment_both_ways() {
        assert!(overlaps(0.0, 10.0, 30.0, 20.0, 0.5));
        assert!(overlaps(12.0, 10.0, 18.0, 20.0, 0.5));
    }

    #[test]
    fn test_duplicates_and_shared_boundaries() {
        assert!(overlaps(10.0, 10.2, 20.0, 19.9, 0.5));
        assert!(overlaps(10.0, 10.0, 25.0, 20.0, 0.5));
        assert!(overlaps(5.0, 10.0, 20.0, 20.0, 0.5));
    }

    #[test]
    fn test_disjoint_intervals() {
        assert!(!overlaps(30.0, 10.0, 40.0, 20.0, 0.5));
        assert!(!overlaps(0.0, 10.0, 5.0, 20.0, 0.5));
    }
}
