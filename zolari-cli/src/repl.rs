//! Live view and interactive prompt.

use std::io::{self, BufRead, Write};

use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType};
use tokio::sync::mpsc;
use zolari_core::view::{AppView, Logo};
use zolari_core::{AppState, ResearchDraft};

use crate::commands::{Client, browser_login};

const HELP: &str = "\
Commands:
  login               Log in through the browser
  logout              End the session
  submit [topic]      Submit the request form (sets the topic first if given)
  topic <text>        Set the research topic
  type <name>         Set the research type, e.g. technology-trends
  depth <1-5>         Set the depth level
  urgency <level>     Standard, High or Low
  refresh             Fetch results now
  help                Show this help
  quit                Exit";

/// One line of input at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum PromptCommand {
    Login,
    Logout,
    Submit(Option<String>),
    Topic(String),
    Type(String),
    Depth(String),
    Urgency(String),
    Refresh,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(input: &str) -> PromptCommand {
    let input = input.trim();
    let (cmd, arg) = match input.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (input, ""),
    };
    let arg = arg.to_string();
    match cmd.to_lowercase().as_str() {
        "login" => PromptCommand::Login,
        "logout" => PromptCommand::Logout,
        "submit" if arg.is_empty() => PromptCommand::Submit(None),
        "submit" => PromptCommand::Submit(Some(arg)),
        "topic" => PromptCommand::Topic(arg),
        "type" => PromptCommand::Type(arg),
        "depth" => PromptCommand::Depth(arg),
        "urgency" => PromptCommand::Urgency(arg),
        "refresh" => PromptCommand::Refresh,
        "help" | "?" => PromptCommand::Help,
        "quit" | "exit" | "q" => PromptCommand::Quit,
        _ => PromptCommand::Unknown(input.to_string()),
    }
}

fn render_screen(state: &AppState, draft: &ResearchDraft) -> io::Result<()> {
    let mut out = io::stdout();
    crossterm::execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    write!(out, "{}", AppView { state, draft })?;
    writeln!(
        out,
        "\n\x1b[90mUpdated {} | Ctrl-C to exit\x1b[0m",
        chrono::Local::now().format("%H:%M:%S")
    )?;
    out.flush()
}

/// Read lines on a dedicated thread so the prompt loop can also react to
/// state changes. The receiver closes at end of input.
fn spawn_line_reader<R: BufRead + Send + 'static>(mut reader: R) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read input");
                    break;
                }
            }
        }
    });
    rx
}

fn print_prompt() -> io::Result<()> {
    print!("\x1b[1;34m> \x1b[0m");
    io::stdout().flush()
}

/// Re-render on every state change until Ctrl-C.
pub async fn watch(client: Client) -> anyhow::Result<()> {
    let controller = &client.controller;
    let draft = ResearchDraft::default();
    let mut rx = controller.subscribe();

    controller.start(None).await;
    let state = rx.borrow_and_update().clone();
    render_screen(&state, &draft)?;
    if !state.is_authenticated() {
        println!("Run `zolari auth login` to sign in.");
        return Ok(());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                render_screen(&state, &draft)?;
            }
            _ = &mut ctrl_c => break,
        }
    }

    controller.shutdown().await;
    Ok(())
}

/// Run the interactive prompt. Background refreshes re-render the view
/// while the prompt waits for input.
pub async fn run_interactive(client: Client) -> anyhow::Result<()> {
    print!("{}", Logo);
    println!("  Type help for commands, quit to exit\n");

    let controller = &client.controller;
    let mut draft = ResearchDraft::default();
    let mut rx = controller.subscribe();
    controller.start(None).await;
    print!("{}", AppView {
        state: &rx.borrow_and_update().clone(),
        draft: &draft,
    });

    let mut lines = spawn_line_reader(io::BufReader::new(io::stdin()));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        print_prompt()?;

        let input = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                println!();
                print!("{}", AppView { state: &state, draft: &draft });
                continue;
            }
            _ = &mut ctrl_c => {
                println!();
                break;
            }
        };
        if input.trim().is_empty() {
            continue;
        }

        match parse_command(&input) {
            PromptCommand::Quit => {
                println!("Goodbye!");
                break;
            }
            PromptCommand::Help => {
                println!("{}", HELP);
                continue;
            }
            PromptCommand::Unknown(cmd) => {
                println!("Unknown command: '{}'. Type help for commands.", cmd);
                continue;
            }
            PromptCommand::Login => {
                if controller.snapshot().is_authenticated() {
                    println!("Already logged in.");
                    continue;
                }
                match controller.login().await {
                    Ok(login_url) => {
                        match browser_login(&login_url, &client.config.identity.redirect_uri).await
                        {
                            Ok(location) => {
                                controller.start(Some(&location)).await;
                            }
                            Err(e) => println!("\x1b[31mLogin failed: {}\x1b[0m", e),
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "Login could not start"),
                }
            }
            PromptCommand::Logout => match controller.logout().await {
                Ok(logout_url) => {
                    if open::that(logout_url.as_str()).is_err() {
                        println!("To end the provider session, visit:\n  {}", logout_url);
                    }
                }
                Err(e) => println!("\x1b[31mLogout failed: {}\x1b[0m", e),
            },
            PromptCommand::Submit(topic) => {
                if let Some(topic) = topic {
                    draft.topic = topic;
                }
                if let Err(e) = controller.submit(&mut draft).await {
                    println!("\x1b[31m{}\x1b[0m", e);
                }
            }
            PromptCommand::Topic(topic) => draft.topic = topic,
            PromptCommand::Type(value) => match value.parse() {
                Ok(research_type) => draft.research_type = research_type,
                Err(e) => println!("{}", e),
            },
            PromptCommand::Depth(value) => match value.parse() {
                Ok(depth) => draft.depth = depth,
                Err(e) => println!("{}", e),
            },
            PromptCommand::Urgency(value) => match value.parse() {
                Ok(urgency) => draft.urgency = urgency,
                Err(e) => println!("{}", e),
            },
            PromptCommand::Refresh => controller.refresh_now().await,
        }

        // Changes made by the command are rendered here, not again by the watcher.
        let state = rx.borrow_and_update().clone();
        println!();
        print!("{}", AppView {
            state: &state,
            draft: &draft,
        });
    }

    controller.shutdown().await;
    Ok(())
}
