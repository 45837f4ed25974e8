// The binary uses the library, not duplicate modules
use lrs_editor::{LrsEditorApp, Settings, setup_logging};
use std::process::ExitCode;

fn main() -> ExitCode {
    setup_logging();
    let settings = Settings::from_cli();
    match LrsEditorApp::new(settings).and_then(|app| app.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
