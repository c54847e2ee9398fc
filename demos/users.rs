//! User-management bot over Gemini function calling.
//!
//! Usage:
//!   GEMINI_API_KEY=... cargo run --example users
//!   GEMINI_API_KEY=... cargo run --example users -- --model gemini-1.5-pro --temperature 0.3
//!
//! Type "exit" to leave.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use clap::Parser;
use gemini_chat::{
    ChatConfig, ChatEvent, ChatSession, FnHandler, FunctionParameters, GenerationOverrides,
    SchemaType, ToolError, ToolRegistry, ToolSpec, DEFAULT_MODEL,
};
use serde_json::{json, Map, Value};

const SYSTEM_INSTRUCTION: &str = "You are a user management bot. \
Start by greeting the user, ask for credentials and inform them that typing 'exit' will end the conversation. \
Check the usernames list, and if the user isn't in the list, refuse to answer anything. \
If no username is provided then ask again which user is currently talking. \
Upon confirmation you should inform them that they can get the list of usernames, add users to the list and logout by typing logout. \
Only known users can talk to you, and only known users can add new users to the list. \
If a user logs out, you should acknowledge it and inform them that they can type another username to start again.";

#[derive(Parser)]
#[command(name = "users", about = "Chat with the user-management bot")]
struct Cli {
    /// Model to use
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Replace the built-in system instruction
    #[arg(long, short = 's')]
    system: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f64>,

    /// Nucleus sampling threshold
    #[arg(long)]
    top_p: Option<f64>,

    /// Top-k sampling
    #[arg(long)]
    top_k: Option<u32>,

    /// Max output tokens per turn
    #[arg(long)]
    max_output_tokens: Option<u32>,

    /// Max model turns per message
    #[arg(long, default_value_t = 20)]
    max_turns: usize,

    /// API base URL
    #[arg(long)]
    base_url: Option<String>,
}

/// The user list the tools operate on.
#[derive(Clone)]
struct UserStore {
    users: Arc<Mutex<Vec<String>>>,
}

impl UserStore {
    fn new(initial: &[&str]) -> Self {
        Self {
            users: Arc::new(Mutex::new(initial.iter().map(|s| s.to_string()).collect())),
        }
    }

    fn names(&self) -> Result<Vec<String>, ToolError> {
        self.users
            .lock()
            .map(|u| u.clone())
            .map_err(|_| ToolError::Failed("user list poisoned".into()))
    }

    fn add(&self, name: String) -> Result<(), ToolError> {
        self.users
            .lock()
            .map(|mut u| u.push(name))
            .map_err(|_| ToolError::Failed("user list poisoned".into()))
    }

    fn tools(&self) -> ToolRegistry {
        let list = self.clone();
        let add = self.clone();
        ToolRegistry::new()
            .add(ToolSpec::new(
                "getUserNames",
                "Get the list of user names",
                FnHandler(move |_: &Map<String, Value>| -> Result<Value, ToolError> {
                    Ok(json!({ "usernames": list.names()? }))
                }),
            ))
            .add(
                ToolSpec::new(
                    "addUser",
                    "Add a user to the list",
                    FnHandler(move |args: &Map<String, Value>| -> Result<Value, ToolError> {
                        let name = args
                            .get("name")
                            .and_then(Value::as_str)
                            .ok_or_else(|| ToolError::InvalidArguments("name must be a string".into()))?;
                        add.add(name.to_string())?;
                        Ok(json!({ "success": true }))
                    }),
                )
                .with_parameters(
                    FunctionParameters::object()
                        .property("name", SchemaType::String, "The name of the user to add")
                        .required("name"),
                ),
            )
    }
}

fn print_reply(text: &str) {
    eprint!("\x1b[1;32mbot>\x1b[0m ");
    println!("{}", text.trim_end());
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("error: GEMINI_API_KEY not set");
        std::process::exit(1);
    });

    let store = UserStore::new(&["Alice", "Bob", "Charlie"]);

    let mut config = ChatConfig::new(api_key, store.tools())
        .with_model(&cli.model)
        .with_system_instruction(cli.system.as_deref().unwrap_or(SYSTEM_INSTRUCTION))
        .with_generation(GenerationOverrides {
            temperature: cli.temperature,
            top_p: cli.top_p,
            top_k: cli.top_k,
            max_output_tokens: cli.max_output_tokens,
            response_mime_type: None,
        })
        .with_max_turns(cli.max_turns);
    if let Some(ref url) = cli.base_url {
        config = config.with_base_url(url);
    }

    let mut chat = match ChatSession::new(config) {
        Ok(chat) => chat,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("model: {}", cli.model);
    eprintln!("---");

    match chat.initial_message().await {
        Ok(text) => print_reply(&text),
        Err(e) => eprintln!("\x1b[1;31merror:\x1b[0m {e}"),
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        eprint!("\x1b[1;36myou>\x1b[0m ");
        io::stderr().flush().ok();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };
        if line == "exit" {
            break;
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel::<ChatEvent>(64);

        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    ChatEvent::FunctionCall { name, args } => {
                        eprintln!("\x1b[33m  [call: {name}]\x1b[0m {}", Value::Object(args));
                    }
                    ChatEvent::FunctionResult {
                        name,
                        response,
                        is_error,
                    } => {
                        let tag = if is_error { "error" } else { "result" };
                        eprintln!("\x1b[33m  [{tag}: {name}]\x1b[0m {response}");
                    }
                    _ => {}
                }
            }
        });

        let result = chat.send_message_streaming(&line, tx).await;
        printer.await.ok();
        match result {
            Ok(text) => print_reply(&text),
            Err(e) => eprintln!("\x1b[1;31merror:\x1b[0m {e}"),
        }
    }

    let usage = chat.usage();
    eprintln!(
        "\x1b[2m  [{}in / {}out tokens]\x1b[0m",
        usage.prompt_tokens, usage.candidate_tokens
    );
    eprintln!("bye.");
}
