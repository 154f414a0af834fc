use std::time::Instant;

use tracing::Dispatch;
use wirecall_rpc::{Client, ClientConfig};

use crate::cmd::{parse_duration, CallArgs};
use crate::demo::DemoMethod;
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS};
use crate::output::{print_call, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let method = args.method.with_args(&args.args)?;
    if args.attempts == 0 {
        return Err(CliError::usage("--attempts must be at least 1"));
    }

    let config = ClientConfig::default()
        .with_max_connection_attempts(args.attempts)
        .with_call_timeout(parse_duration(&args.timeout)?)
        .with_logger(Dispatch::default());

    let client: Client<DemoMethod> = Client::new(config);
    client
        .connect(&args.host, args.port)
        .map_err(|err| rpc_error("connect failed", err))?;
    let peer = client.peer_addr();

    let started = Instant::now();
    let outcome = client.call(method);
    let elapsed = started.elapsed();
    client.disconnect();

    let result = outcome.map_err(|err| rpc_error("call failed", err))?;
    print_call(args.method, peer, &result, elapsed, format);
    Ok(SUCCESS)
}
