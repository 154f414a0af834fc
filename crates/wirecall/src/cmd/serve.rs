use std::sync::mpsc;

use tracing::{info, Dispatch};
use wirecall_rpc::{Server, ServerConfig};

use crate::cmd::{parse_duration, ServeArgs};
use crate::demo::{DemoMethod, DemoPerformer};
use crate::exit::{rpc_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ServerConfig::default()
        .with_threads(args.threads)
        .with_shutdown_grace(parse_duration(&args.grace)?)
        .with_logger(Dispatch::default());

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;

    let server: Server<DemoMethod, DemoPerformer> = Server::new(config, DemoPerformer);
    let addr = server
        .start(&args.host, args.port)
        .map_err(|err| rpc_error("start failed", err))?;
    print_listening(addr, args.threads, format);

    // A closed channel means the handler is gone; stop either way.
    let _ = stop_rx.recv();
    info!(%addr, "interrupt received, stopping");
    server.stop();

    Ok(SUCCESS)
}
