use std::process::ExitCode;

use tokio::io::BufReader;
use tokio::runtime::{Builder, Runtime};

use lsmgr::cli::{self, Args, Mode};
use lsmgr::{logging, worker, Shell, StreamRegistry};

fn runtime(multi_thread: bool) -> std::io::Result<Runtime> {
    let mut builder = if multi_thread {
        Builder::new_multi_thread()
    } else {
        Builder::new_current_thread()
    };
    builder.enable_all().build()
}

fn main() -> ExitCode {
    let mut args = cli::parse();

    if let Some(Mode::Worker { id, channel }) = args.mode {
        let code = match runtime(false) {
            Ok(rt) => rt.block_on(worker::run_process(id, channel)),
            Err(e) => {
                eprintln!("Unable to start worker runtime: {}", e);
                worker::EXIT_FAILED
            }
        };
        std::process::exit(code);
    }

    logging::init(args.loglevel);

    if args.wants_gomtv_password() {
        match rpassword::prompt_password("GOMTV Password: ") {
            Ok(password) => args.gomtv_password = Some(password),
            Err(e) => {
                eprintln!("Unable to read password: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    match run_shell(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_shell(args: &Args) -> lsmgr::Result<()> {
    let settings = args.shell_settings()?;
    let rt = runtime(true)?;

    let result = rt.block_on(async {
        let mut shell = Shell::new(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            StreamRegistry::new(),
            settings,
        )
        .terminal_secrets();

        shell.run().await
    });

    // A pending stdin read would otherwise hold up the runtime drop.
    rt.shutdown_background();
    result
}
