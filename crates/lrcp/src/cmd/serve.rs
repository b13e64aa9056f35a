use lrcp_session::{Server, SessionConfig, ShutdownHandle};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let retransmit = parse_duration(&args.retransmit)?;
    let idle = parse_duration(&args.idle)?;
    let config = SessionConfig::default()
        .with_retransmit_interval(retransmit)
        .with_idle_timeout(idle);

    let server =
        Server::line_reverse(args.bind, config).map_err(|err| session_error("bind failed", err))?;
    install_ctrlc_handler(server.shutdown_handle())?;
    print_listening(server.local_addr(), retransmit, idle, format);

    server
        .run()
        .map_err(|err| session_error("receive failed", err))?;
    tracing::info!("shutdown complete");
    Ok(SUCCESS)
}

fn install_ctrlc_handler(handle: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received, shutting down");
        handle.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
