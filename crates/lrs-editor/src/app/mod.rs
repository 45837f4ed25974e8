//! Application module
//!
//! Loads the project document, runs one command against it and stores it again:
//! - `init` / `add-class` set up a project
//! - `update` runs a complete route update against a basesystem export
//! - `pending` / `approve` / `check` drive the approval workflow
//! - `names` lists unused event names

pub(crate) mod settings;
pub(crate) mod storage;

use crate::app::settings::{ClassKind, Command, Settings};
use crate::app::storage::{
    FileStorage, StorageBackend, StorageError, load_json_backend, load_json_file, save_json_backend,
};
use chrono::Utc;
use lrs_lib::{
    ContinuousEventClass, EventClass, LrsError, PointEventClass, Project, ProjectConfig, RawNetwork,
    RouteUpdateOutcome, RunLog, Synchronize, TourEventClass,
};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Storage key of the project document
const PROJECT_KEY: &str = "project";

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Lrs(#[from] LrsError),

    #[error("No project found, run `lrs-editor init` first")]
    NoProject,

    #[error("A project exists already")]
    ProjectExists,
}

pub type AppResult<T> = Result<T, AppError>;

pub struct LrsEditorApp {
    settings: Settings,
    storage: Box<dyn StorageBackend>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl LrsEditorApp {
    /// App storing its project in `settings.project_dir`
    pub fn new(settings: Settings) -> AppResult<Self> {
        let storage = FileStorage::new(&settings.project_dir)?;
        Ok(Self::with_storage(settings, Box::new(storage)))
    }

    pub fn with_storage(settings: Settings, storage: Box<dyn StorageBackend>) -> Self {
        Self { settings, storage }
    }

    fn load_project(&self) -> AppResult<Project> {
        let mut project: Project =
            load_json_backend(self.storage.as_ref(), PROJECT_KEY)?.ok_or(AppError::NoProject)?;
        if let Some(tolerance) = self.settings.tolerance {
            tracing::info!(tolerance, "tolerance overridden for this run");
            project.config.tolerance = tolerance;
        }
        Ok(project)
    }

    fn save_project(&self, project: &Project) -> AppResult<()> {
        let mut stored = project.clone();
        if self.settings.tolerance.is_some() {
            // Overrides apply to one run only
            if let Some(original) = load_json_backend::<Project>(self.storage.as_ref(), PROJECT_KEY)? {
                stored.config.tolerance = original.config.tolerance;
            }
        }
        save_json_backend(self.storage.as_ref(), PROJECT_KEY, &stored)?;
        Ok(())
    }

    /// Run the command given on the command line
    pub fn run(&self) -> AppResult<()> {
        match &self.settings.command {
            Command::Init {
                name,
                tolerance,
                srid,
            } => self.init(ProjectConfig {
                name: name.clone(),
                tolerance: *tolerance,
                srid: *srid,
            }),
            Command::AddClass { kind, name } => self.add_class(*kind, name),
            Command::Update {
                basesystem,
                cascade_delete,
            } => {
                let network = Self::read_basesystem(basesystem)?;
                self.update(&network, *cascade_delete).map(|_| ())
            }
            Command::Pending { class } => self.pending(class),
            Command::Approve { class, all, uuids } => self.approve(class, *all, uuids).map(|_| ()),
            Command::Check { class } => self.check(class),
            Command::Names { class } => self.names(class),
        }
    }

    fn read_basesystem(path: &Path) -> AppResult<RawNetwork> {
        let network: RawNetwork = load_json_file(path)?;
        tracing::info!(
            path = %path.display(),
            lines = network.lines.len(),
            nodes = network.nodes.len(),
            "basesystem loaded"
        );
        Ok(network)
    }

    pub fn init(&self, config: ProjectConfig) -> AppResult<()> {
        if self.storage.get_string(PROJECT_KEY)?.is_some() {
            return Err(AppError::ProjectExists);
        }
        tracing::info!(name = %config.name, tolerance = config.tolerance, srid = config.srid, "project created");
        save_json_backend(self.storage.as_ref(), PROJECT_KEY, &Project::new(config))?;
        Ok(())
    }

    pub fn add_class(&self, kind: ClassKind, name: &str) -> AppResult<()> {
        let mut project = self.load_project()?;
        let class: EventClass = match kind {
            ClassKind::Point => PointEventClass::new(name).into(),
            ClassKind::Continuous => ContinuousEventClass::new(name).into(),
            ClassKind::Tour => TourEventClass::new(name).into(),
        };
        project.add_class(class)?;
        self.save_project(&project)
    }

    /// Route update run; the project is only stored if the run was not aborted
    pub fn update(&self, network: &RawNetwork, cascade_delete: bool) -> AppResult<RouteUpdateOutcome> {
        let mut project = self.load_project()?;
        let mut log = RunLog::new();
        let outcome = project.update_routes(network, &mut log)?;
        if cascade_delete && !outcome.blocked.is_empty() {
            let removed = project.delete_routes_with_events(&outcome.blocked, &mut log);
            tracing::info!(removed, "events of vanished routes deleted");
        }
        self.save_project(&project)?;

        println!(
            "Routes: {} inserted, {} updated, {} deleted, {} invalid",
            outcome.inserted, outcome.updated, outcome.deleted, outcome.invalid
        );
        println!(
            "Events: {} updated, {} set to pending, {} deleted",
            outcome.events.measure_only + outcome.events.relocated,
            outcome.events.relocated,
            outcome.events.deleted
        );
        for orphan in &outcome.orphans {
            println!("Points without LineString: {orphan}");
        }
        if !cascade_delete {
            for blocked in &outcome.blocked {
                println!(
                    "Not deleted: {} (events of class {})",
                    blocked.route_name, blocked.event_class
                );
            }
        }
        println!("{}", log.summary());
        Ok(outcome)
    }

    pub fn pending(&self, class: &str) -> AppResult<()> {
        let project = self.load_project()?;
        let gate = project.approval_gate();
        for (route, entries) in gate.list_pending(project.class(class)?) {
            println!("{route}");
            for entry in entries {
                println!("  {:>12.3}  {}  {}", entry.measure, entry.name, entry.uuid);
            }
        }
        Ok(())
    }

    /// Approve the given events, or all pending events; returns the number approved
    pub fn approve(&self, class: &str, all: bool, uuids: &[Uuid]) -> AppResult<usize> {
        let mut project = self.load_project()?;
        let now = Utc::now();
        let approved = if all {
            project.approve_all(class, now)?
        } else {
            let mut approved = 0;
            for uuid in uuids {
                if project.approve(class, *uuid, now)? {
                    approved += 1;
                }
            }
            approved
        };
        self.save_project(&project)?;
        println!("{approved} events approved");
        Ok(approved)
    }

    pub fn check(&self, class: &str) -> AppResult<()> {
        let project = self.load_project()?;
        let gate = project.approval_gate();
        let errors = gate.list_continuity_errors(project.class(class)?);
        if errors.is_empty() {
            println!("No continuity errors");
        }
        for (route, issues) in errors {
            println!("{route}");
            for issue in issues {
                println!("  {:>12.3}  {}  {}", issue.measure, issue.kind, issue.name);
            }
        }
        Ok(())
    }

    pub fn names(&self, class: &str) -> AppResult<()> {
        let project = self.load_project()?;
        let class = project.class(class)?;
        tracing::debug!(class = class.name(), kind = %class.kind(), "listing unused names");
        for name in class.unused_names() {
            println!("{name}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::storage::MemoryStorage;
    use clap::Parser;
    use geo::{Coord, LineString};
    use lrs_lib::{LineFeature, NodeFeature};

    fn app(args: &[&str]) -> LrsEditorApp {
        let mut argv = vec!["lrs-editor"];
        argv.extend_from_slice(args);
        LrsEditorApp::with_storage(Settings::parse_from(argv), Box::new(MemoryStorage::new()))
    }

    fn network(end: f64) -> RawNetwork {
        let node = |id, node_type, x| NodeFeature {
            id,
            route_name: Some("R".into()),
            sortnr: Some(1),
            node_type: Some(node_type),
            point: Coord { x, y: 0.0 },
        };
        RawNetwork {
            basesystem_id: 1,
            lines: vec![LineFeature {
                id: 1,
                route_name: Some("R".into()),
                geometry: LineString::from(vec![(0.0, 0.0), (end, 0.0)]),
                pathnr: None,
            }],
            nodes: vec![node(1, 1, 0.0), node(2, 2, end)],
        }
    }

    #[test]
    fn test_commands_need_a_project() {
        let app = app(&["names", "surface"]);
        assert!(matches!(app.run(), Err(AppError::NoProject)));
        app.init(ProjectConfig::default()).unwrap();
        assert!(matches!(app.init(ProjectConfig::default()), Err(AppError::ProjectExists)));
        assert!(matches!(app.run(), Err(AppError::Lrs(LrsError::UnknownEventClass(_)))));
    }

    #[test]
    fn test_update_and_approve_cycle() {
        let app = app(&["pending", "surface"]);
        app.init(ProjectConfig::default()).unwrap();
        app.add_class(ClassKind::Continuous, "surface").unwrap();
        let outcome = app.update(&network(100.0), false).unwrap();
        assert_eq!(outcome.inserted, 1);

        // Place one event covering the route directly in the stored project
        let mut project = app.load_project().unwrap();
        let route = project.routes.by_name("R").unwrap().clone();
        let class = project
            .class_mut("surface")
            .unwrap()
            .as_continuous_mut()
            .unwrap();
        let name = class.names_mut().add("asphalt").unwrap();
        let name = class.names().get(name).unwrap().uuid;
        class
            .insert(&route, name, Coord { x: 0.0, y: 0.0 }, 0.001, Utc::now())
            .unwrap();
        app.save_project(&project).unwrap();

        let outcome = app.update(&network(80.0), false).unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.events.relocated, 1);
        app.run().unwrap();
        assert_eq!(app.approve("surface", true, &[]).unwrap(), 1);
        assert_eq!(app.approve("surface", true, &[]).unwrap(), 0);
    }

    #[test]
    fn test_tolerance_override_is_not_stored() {
        let app = app(&["--tolerance", "0.5", "names", "surface"]);
        app.init(ProjectConfig::default()).unwrap();
        assert_eq!(app.load_project().unwrap().config.tolerance, 0.5);
        app.add_class(ClassKind::Point, "surface").unwrap();
        let stored: Project = load_json_backend(app.storage.as_ref(), PROJECT_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(stored.config.tolerance, 0.001);
        assert_eq!(stored.classes.len(), 1);
    }

    #[test]
    fn test_vanished_route_cascade() {
        let app = app(&["names", "surface"]);
        app.init(ProjectConfig::default()).unwrap();
        app.add_class(ClassKind::Continuous, "surface").unwrap();
        app.update(&network(100.0), false).unwrap();
        let mut project = app.load_project().unwrap();
        let route = project.routes.by_name("R").unwrap().clone();
        let class = project
            .class_mut("surface")
            .unwrap()
            .as_continuous_mut()
            .unwrap();
        let name = class.names_mut().add("asphalt").unwrap();
        let name = class.names().get(name).unwrap().uuid;
        class
            .insert(&route, name, Coord { x: 0.0, y: 0.0 }, 0.001, Utc::now())
            .unwrap();
        app.save_project(&project).unwrap();

        let outcome = app.update(&RawNetwork::default(), false).unwrap();
        assert_eq!(outcome.blocked.len(), 1);
        assert_eq!(app.load_project().unwrap().routes.len(), 1);
        app.update(&RawNetwork::default(), true).unwrap();
        assert!(app.load_project().unwrap().routes.is_empty());
    }
}
