mod logging;
mod settings;

use settings::Settings;
use std::process::ExitCode;
use subbasin_lib::Pipeline;

fn main() -> ExitCode {
    logging::setup_logging();

    let config = match Settings::from_cli().into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = {
        profiling::scope!("pipeline");
        Pipeline::new(config).run()
    };

    match result {
        Ok(report) => {
            if let Some(output) = &report.output {
                println!("Wrote {}", output.display());
            }
            if !report.diagnostics.is_empty() {
                println!("{} items skipped:", report.diagnostics.len());
                for diagnostic in report.diagnostics.iter() {
                    println!("  {diagnostic}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
