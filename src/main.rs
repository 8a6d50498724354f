mod stdio;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use sk_assist::{
    handle_panel_message, run_command, ConfigStore, EditorCommand, Exchange, FileSettings,
    InboundMessage, RequestOrchestrator, Settings, SkillClient,
};

use crate::stdio::{FileHost, HostEvent, LineRange, StdoutSurface};

#[tokio::main]
async fn main() {
    // Load .env file (if present) before anything reads env vars
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    if args.iter().any(|a| a == "--default-config") {
        print!("{}", Settings::default_config_contents());
        return;
    }

    // stdout carries panel messages, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opts = match CliOptions::parse(&args[1..]) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{e}\n\nRun with --help for usage.");
            std::process::exit(2);
        }
    };

    // Surface parse errors up front; later reloads fall back to defaults.
    if let Err(e) = Settings::load(opts.config.as_deref()) {
        error!("failed to load config: {e}");
        std::process::exit(1);
    }

    let store = Arc::new(ConfigStore::new(Arc::new(FileSettings::new(
        opts.config.clone(),
    ))));

    let client = match SkillClient::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let host = Arc::new(FileHost {
        path: opts.file.clone(),
        lines: opts.lines,
        input: opts.prompt.clone(),
    });

    let orchestrator = Arc::new(RequestOrchestrator::new(
        store,
        client,
        host,
        Arc::new(StdoutSurface),
    ));

    let snapshot = orchestrator.config().snapshot();
    info!(
        service_url = snapshot.connection.service_url.as_deref().unwrap_or("<unset>"),
        backend = ?snapshot.connection.completion_backend,
        timeout_length = snapshot.behavior.timeout_length,
        "sk-assist starting"
    );

    if opts.stdio {
        run_stdio(orchestrator).await;
        return;
    }

    let exchange = match opts.command {
        Some(command) => match run_command(&orchestrator, command).await {
            Some(exchange) => exchange,
            None => {
                warn!(command = command.id(), "nothing to ask, provide a prompt");
                std::process::exit(2);
            }
        },
        None => {
            orchestrator
                .search(
                    opts.prompt.as_deref(),
                    opts.skill.as_deref(),
                    opts.function.as_deref(),
                )
                .await
        }
    };

    exit_for(&exchange);
}

/// Serve panel messages and host events from stdin until EOF.  Requests run
/// concurrently; nothing orders their responses.
async fn run_stdio(orchestrator: Arc<RequestOrchestrator>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("failed to read stdin: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Ok(HostEvent::ConfigChanged { keys }) = serde_json::from_str::<HostEvent>(line) {
            let reloaded = orchestrator.config().on_config_keys_changed(&keys[..]);
            info!(?keys, reloaded, "configuration change");
            continue;
        }

        match serde_json::from_str::<InboundMessage>(line) {
            Ok(message) => {
                let orchestrator = orchestrator.clone();
                tasks.spawn(async move {
                    handle_panel_message(&orchestrator, message).await;
                });
            }
            Err(e) => warn!(err = %e, "ignoring unrecognised input line"),
        }
    }

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!("request task failed: {e}");
        }
    }
}

fn exit_for(exchange: &Exchange) {
    if !exchange.is_success() {
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    file: Option<PathBuf>,
    lines: Option<LineRange>,
    skill: Option<String>,
    function: Option<String>,
    command: Option<EditorCommand>,
    stdio: bool,
    prompt: Option<String>,
}

impl CliOptions {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = CliOptions::default();
        let mut words = Vec::new();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("{name} requires a value"))
            };
            match arg.as_str() {
                "--config" => opts.config = Some(PathBuf::from(value("--config")?)),
                "--file" => opts.file = Some(PathBuf::from(value("--file")?)),
                "--lines" => {
                    let raw = value("--lines")?;
                    opts.lines = Some(
                        LineRange::parse(&raw)
                            .ok_or_else(|| format!("invalid line range \"{raw}\""))?,
                    );
                }
                "--skill" => opts.skill = Some(value("--skill")?),
                "--function" => opts.function = Some(value("--function")?),
                "--command" => {
                    let raw = value("--command")?;
                    opts.command = Some(
                        EditorCommand::from_id(&raw)
                            .ok_or_else(|| format!("unknown command \"{raw}\""))?,
                    );
                }
                "--stdio" => opts.stdio = true,
                other if other.starts_with("--") => return Err(format!("unknown option {other}")),
                other => words.push(other.to_string()),
            }
        }

        if !words.is_empty() {
            opts.prompt = Some(words.join(" "));
        }
        Ok(opts)
    }
}

fn print_usage() {
    println!(
        "sk-assist — ask a Semantic Kernel skill service about your code

USAGE:
    sk-assist [OPTIONS] [PROMPT...]

OPTIONS:
    --config <PATH>       Path to config file (default: ~/.config/sk-assist/config.toml)
    --default-config      Print default config to stdout and exit
    --file <PATH>         Document to send (re-read for every request)
    --lines <START:END>   Send only these lines of the document (1-based, inclusive)
    --skill <NAME>        Skill to invoke (default: Code)
    --function <NAME>     Function to invoke (default: Ask)
    --command <ID>        Run an editor command: codeAsk, codeExplain, codeRefactor,
                          codeOptimize, codeProblem
    --stdio               Read panel messages and config events as JSON lines on stdin
    -h, --help            Print this help message

OUTPUT:
    Panel messages are written to stdout as JSON lines:
        {{\"type\":\"setPrompt\",\"value\":\"...\"}}
        {{\"type\":\"addResponse\",\"value\":\"...\"}}

STDIO INPUT:
    {{\"type\":\"prompt\",\"value\":\"what does this do?\"}}
    {{\"type\":\"codeSelected\",\"value\":\"let x = 1;\"}}
    {{\"type\":\"configChanged\",\"keys\":[\"semanticKernel.serviceUrl\"]}}

ENVIRONMENT:
    SK_API_KEY                  API key forwarded to the service
    SK_DEPLOYMENT_OR_MODEL_ID   Model id or Azure deployment name
    SK_SERVICE_URL              Base URL of the skill service
    SK_AZURE_OPENAI_ENDPOINT    Azure OpenAI endpoint
    RUST_LOG                    Log filter (default: info)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_options_and_prompt_words() {
        let opts = CliOptions::parse(&args(&[
            "--file", "main.rs", "--lines", "2:4", "--skill", "Code", "--function", "Explain",
            "what", "is", "this",
        ]))
        .unwrap();
        assert_eq!(opts.file, Some(PathBuf::from("main.rs")));
        assert_eq!(opts.lines, Some(LineRange { start: 2, end: 4 }));
        assert_eq!(opts.skill.as_deref(), Some("Code"));
        assert_eq!(opts.function.as_deref(), Some("Explain"));
        assert_eq!(opts.prompt.as_deref(), Some("what is this"));
        assert!(!opts.stdio);
    }

    #[test]
    fn parses_command() {
        let opts = CliOptions::parse(&args(&["--command", "codeRefactor"])).unwrap();
        assert_eq!(opts.command, Some(EditorCommand::CodeRefactor));
        assert!(opts.prompt.is_none());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(CliOptions::parse(&args(&["--file"])).is_err());
        assert!(CliOptions::parse(&args(&["--lines", "x"])).is_err());
        assert!(CliOptions::parse(&args(&["--command", "codeDance"])).is_err());
        assert!(CliOptions::parse(&args(&["--verbose"])).is_err());
    }
}
