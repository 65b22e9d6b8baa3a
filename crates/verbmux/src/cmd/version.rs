use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    git_hash: &'static str,
    protocol: Protocol,
}

#[derive(Serialize)]
struct Protocol {
    terminator: u8,
    error_verb: &'static str,
    verb_delimiter: char,
    max_header_size: usize,
}

fn version_info() -> VersionInfo {
    VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("VERBMUX_BUILD_TARGET").unwrap_or("unknown"),
        target_os: std::env::consts::OS,
        target_arch: std::env::consts::ARCH,
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        protocol: Protocol {
            terminator: verbmux_frame::TERMINATOR,
            error_verb: verbmux_peer::ERROR_VERB,
            verb_delimiter: verbmux_peer::VERB_DELIMITER,
            max_header_size: verbmux_frame::DEFAULT_MAX_HEADER_SIZE,
        },
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let info = version_info();
    if matches!(format, OutputFormat::Json) && args.extended {
        println!(
            "{}",
            serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(SUCCESS);
    }

    if !args.extended {
        println!("{} {}", info.name, info.version);
        return Ok(SUCCESS);
    }

    println!("name: {}", info.name);
    println!("version: {}", info.version);
    println!("target: {}", info.target);
    println!("target_os: {}", info.target_os);
    println!("target_arch: {}", info.target_arch);
    println!("git_hash: {}", info.git_hash);
    println!(
        "protocol: terminator=0x{:02x} error_verb={} delimiter={} max_header={}",
        info.protocol.terminator,
        info.protocol.error_verb,
        info.protocol.verb_delimiter,
        info.protocol.max_header_size
    );

    Ok(SUCCESS)
}
