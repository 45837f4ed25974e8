use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// LRS Editor - keeps linearly referenced events in line with a changing basesystem
pub struct Settings {
    /// Directory holding the project document
    #[clap(short, long, value_name = "DIR", default_value = ".")]
    pub project_dir: PathBuf,

    /// Override the project tolerance for this run only
    #[clap(long)]
    pub tolerance: Option<f64>,

    #[clap(subcommand)]
    pub command: Command,
}

/// Kind of a new event class
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Point,
    Continuous,
    Tour,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create an empty project
    Init {
        #[clap(long, default_value = "lrs")]
        name: String,

        /// Distance below which positions and measures are considered equal
        #[clap(long, default_value = "0.001")]
        tolerance: f64,

        /// Spatial reference id of all geometries
        #[clap(long, default_value = "2056")]
        srid: u32,
    },

    /// Add an event class to the project
    AddClass {
        #[clap(value_enum)]
        kind: ClassKind,
        name: String,
    },

    /// Synchronize routes and events with a basesystem export
    Update {
        /// Basesystem JSON document (lines and nodes)
        #[clap(value_name = "FILE")]
        basesystem: PathBuf,

        /// Delete vanished routes together with the events still located on them
        #[clap(long, default_value = "false")]
        cascade_delete: bool,
    },

    /// List events of a class awaiting approval
    Pending { class: String },

    /// Approve events of a class
    Approve {
        class: String,

        /// Approve every pending event of the class
        #[clap(long, default_value = "false")]
        all: bool,

        /// Events to approve
        uuids: Vec<Uuid>,
    },

    /// Report measure continuity problems on routes with pending events
    Check { class: String },

    /// List event names of a class that nothing refers to
    Names { class: String },
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }
}
