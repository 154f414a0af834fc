use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("wirecall {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!(
        "target: {}",
        option_env!("WIRECALL_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("wire: NUL-delimited frames, JSON payloads");
    println!(
        "max payload: {} bytes",
        wirecall_frame::DEFAULT_MAX_PAYLOAD
    );
    println!(
        "features: rpc={}, async={}, cli=true",
        cfg!(feature = "rpc"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
