//! CLI entry point.
//!
//! # Responsibility
//! - Print the linked `talkbook_core` version.
//! - Summarize a `.xuk` project given as the first argument.
//! - Log to `TALKBOOK_LOG_DIR` (absolute) when it is set.

use std::process::ExitCode;
use talkbook_core::{init_logging, LogLevel, Project, XukConfig};

fn main() -> ExitCode {
    println!("talkbook_core version={}", talkbook_core::core_version());
    if let Some(log_dir) = std::env::var_os("TALKBOOK_LOG_DIR") {
        if let Err(err) = init_logging(LogLevel::for_build().as_str(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }
    let Some(path) = std::env::args_os().nth(1) else {
        return ExitCode::SUCCESS;
    };

    let project = match Project::open(&path, &XukConfig::default()) {
        Ok(project) => project,
        Err(err) => {
            log::error!("event=cli_open module=cli status=error error={err}");
            eprintln!("cannot open {}: {err}", path.to_string_lossy());
            return ExitCode::FAILURE;
        }
    };

    println!("documents={} metadata={}", project.len(), project.metadata().len());
    for (index, document) in project.documents().iter().enumerate() {
        println!(
            "document[{index}] nodes={} channels={} media_data={} providers={}",
            document.node_count(),
            document.channels().len(),
            document.media_data().len(),
            document.providers().len()
        );
        for channel in document.channels().iter() {
            println!(
                "  channel uid={} name={} kind={}",
                channel.uid(),
                channel.name(),
                channel.kind()
            );
        }
    }
    ExitCode::SUCCESS
}
