use clap::{Arg, ArgAction, Command};
use incanto::config::{Config, SETTABLE_KEYS};
use incanto::controller::{LifecycleController, RequestContext};
use incanto::environment::EnvironmentFacts;
use incanto::model_client::build_model_client;
use incanto::providers::StdTerminalProbe;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("spell")
        .about("Turn a natural-language request into a shell command")
        .long_about(
            "spell asks a language model for a shell command that does what you describe, \
             then lets you run it, refine it, or cancel. When stdout is not a terminal the \
             command is only printed.",
        )
        .arg(
            Arg::new("prompt")
                .help("What the command should do")
                .num_args(1..),
        )
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .help("Model to use (overrides the saved default)")
                .value_name("MODEL")
                .num_args(1),
        )
        .arg(
            Arg::new("yolo")
                .short('y')
                .long("yolo")
                .help("Execute the generated command without asking")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fix")
                .short('f')
                .long("fix")
                .help("Offer to fix commands that fail")
                .action(ArgAction::SetTrue)
                .conflicts_with("no-fix"),
        )
        .arg(
            Arg::new("no-fix")
                .long("no-fix")
                .help("Never offer to fix failed commands")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Show timings and debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("set-default")
                .long("set-default")
                .help("Save a default setting (model, yolo, fix, backend, claude_command)")
                .value_name("KEY=VALUE")
                .num_args(1),
        )
        .arg(
            Arg::new("show-defaults")
                .long("show-defaults")
                .help("Show the saved default settings")
                .action(ArgAction::SetTrue),
        )
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "warn,incanto=debug,spell=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> anyhow::Result<i32> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");
    init_logging(verbose);

    if let Some(assignment) = matches.get_one::<String>("set-default") {
        let mut config = Config::load_from_dir(&Config::get_config_dir()?)?;
        if let Err(e) = config.apply_assignment(assignment) {
            eprintln!("{}", e);
            eprintln!(
                "Usage: spell --set-default KEY=VALUE (keys: {})",
                SETTABLE_KEYS.join(", ")
            );
            return Ok(1);
        }
        config.save()?;
        println!("Default saved: {}", assignment.trim());
        return Ok(0);
    }

    let config = Config::load()?;

    if matches.get_flag("show-defaults") {
        print!("{}", config.describe());
        return Ok(0);
    }

    let prompt = matches
        .get_many::<String>("prompt")
        .unwrap_or_default()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    if prompt.trim().is_empty() {
        eprintln!("No prompt provided. Use 'spell --help' for usage information.");
        return Ok(1);
    }

    let model = matches
        .get_one::<String>("model")
        .cloned()
        .unwrap_or_else(|| config.model.clone());
    let yolo = matches.get_flag("yolo") || config.yolo;
    let fix = if matches.get_flag("no-fix") {
        false
    } else {
        matches.get_flag("fix") || config.fix
    };

    info!("Processing prompt: {:?} (model {}, yolo {}, fix {})", prompt, model, yolo, fix);

    let environment = EnvironmentFacts::detect();
    let context = RequestContext::new(prompt, model.clone(), &environment, yolo, fix, verbose);
    let client = build_model_client(&config, &model);
    let controller = LifecycleController::with_shell(context, &StdTerminalProbe, client);

    controller.run().await
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}
