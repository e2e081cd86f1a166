//! CLI subcommand handlers.

use crate::AuthAction;
use crate::Commands;
use crate::ConfigAction;
use std::path::Path;
use std::sync::Arc;

use url::Url;
use zolari_core::config::{self, ZolariConfig};
use zolari_core::credentials::{CredentialStore, KeyringCredentialStore};
use zolari_core::session::{REDIRECT_TIMEOUT, RedirectListener};
use zolari_core::view::{ErrorBanner, ResultsList};
use zolari_core::{
    AppController, Authenticator, ResearchClient, ResearchDraft, SessionManager,
};

/// Session manager and controller built from one configuration.
pub(crate) struct Client {
    pub config: ZolariConfig,
    pub session: Arc<SessionManager>,
    pub controller: AppController,
}

impl Client {
    pub fn connect(config: ZolariConfig) -> anyhow::Result<Self> {
        Self::with_store(config, Arc::new(KeyringCredentialStore::new()))
    }

    pub fn with_store(
        config: ZolariConfig,
        store: Arc<dyn CredentialStore>,
    ) -> anyhow::Result<Self> {
        let session = Arc::new(SessionManager::new(config.identity.clone(), store));
        let research = Arc::new(ResearchClient::new(&config.service)?);
        let controller = AppController::new(session.clone(), research.clone(), research)
            .with_refresh_interval(config.refresh.interval());
        Ok(Self {
            config,
            session,
            controller,
        })
    }
}

fn load_config(workspace: &Path) -> anyhow::Result<ZolariConfig> {
    config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace).await,
        Commands::Auth { action } => handle_auth(action, workspace).await,
        Commands::Submit {
            topic,
            research_type,
            depth,
            urgency,
        } => {
            let draft = build_draft(
                &topic,
                research_type.as_deref(),
                depth.as_deref(),
                urgency.as_deref(),
            )?;
            handle_submit(draft, workspace).await
        }
        Commands::Results => handle_results(workspace).await,
        Commands::Watch => crate::repl::watch(Client::connect(load_config(workspace)?)?).await,
        Commands::Run => {
            crate::repl::run_interactive(Client::connect(load_config(workspace)?)?).await
        }
    }
}

async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = config::workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = config::write_default_config(workspace)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(workspace)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

/// Bind the redirect listener, send the user to `login_url` and wait for
/// the browser to come back. Returns the location it landed on.
pub(crate) async fn browser_login(login_url: &Url, redirect_uri: &str) -> anyhow::Result<Url> {
    let origin = Url::parse(redirect_uri)
        .map_err(|e| anyhow::anyhow!("Invalid redirect URI '{}': {}", redirect_uri, e))?;
    let listener = RedirectListener::bind(&origin).await?;

    println!("Opening your browser to log in...");
    if let Err(e) = open::that(login_url.as_str()) {
        tracing::warn!(error = %e, "Failed to open browser");
        println!("Open this URL to continue:\n  {}", login_url);
    }
    println!(
        "Waiting for the login to finish (up to {}s)...",
        REDIRECT_TIMEOUT.as_secs()
    );
    Ok(listener.wait(REDIRECT_TIMEOUT).await?)
}

async fn handle_auth(action: AuthAction, workspace: &Path) -> anyhow::Result<()> {
    let config = load_config(workspace)?;
    let client = Client::connect(config)?;
    let session = &client.session;

    match action {
        AuthAction::Login => {
            let login_url = session.login().await?;
            let location =
                browser_login(&login_url, &client.config.identity.redirect_uri).await?;
            complete_login(session, &location).await
        }
        AuthAction::Callback { url } => {
            let location =
                Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid URL '{}': {}", url, e))?;
            complete_login(session, &location).await
        }
        AuthAction::Status => {
            match session.active_session().await? {
                None => println!("Not logged in."),
                Some(stored) => {
                    let email = stored
                        .profile
                        .as_ref()
                        .filter(|p| p.has_email())
                        .map(|p| p.email.as_str())
                        .unwrap_or("(no email)");
                    println!("Logged in as {}", email);
                    match stored.token.expires_at {
                        Some(expires_at) => {
                            let secs = (expires_at - chrono::Utc::now()).num_seconds().max(0);
                            println!("  Access token expires in {}s", secs);
                        }
                        None => println!("  Access token has no expiry"),
                    }
                    if stored.token.refresh_token.is_some() {
                        println!("  Silent renewal available");
                    }
                }
            }
            Ok(())
        }
        AuthAction::Logout => {
            let logout_url = session.logout().await?;
            println!("Logged out locally.");
            if open::that(logout_url.as_str()).is_err() {
                println!("To end the provider session, visit:\n  {}", logout_url);
            }
            Ok(())
        }
        AuthAction::Refresh => {
            let renewed = session.refresh().await?;
            match renewed.token.expires_at {
                Some(expires_at) => println!("Session renewed until {}", expires_at.to_rfc3339()),
                None => println!("Session renewed."),
            }
            Ok(())
        }
    }
}

async fn complete_login(session: &SessionManager, location: &Url) -> anyhow::Result<()> {
    match session.complete_redirect_if_present(location).await? {
        Some(_) => {
            let email = session
                .profile()
                .await?
                .map(|p| p.email)
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "(no email)".to_string());
            println!("Logged in as {}", email);
            Ok(())
        }
        None => anyhow::bail!("The URL does not carry a login response (missing code or state)"),
    }
}

/// Build a draft from command-line values, leaving unset fields at their defaults.
pub(crate) fn build_draft(
    topic: &str,
    research_type: Option<&str>,
    depth: Option<&str>,
    urgency: Option<&str>,
) -> anyhow::Result<ResearchDraft> {
    let mut draft = ResearchDraft::new(topic);
    if let Some(value) = research_type {
        draft.research_type = value.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(value) = depth {
        draft.depth = value.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(value) = urgency {
        draft.urgency = value.parse().map_err(anyhow::Error::msg)?;
    }
    Ok(draft)
}

async fn handle_submit(mut draft: ResearchDraft, workspace: &Path) -> anyhow::Result<()> {
    let client = Client::connect(load_config(workspace)?)?;
    let controller = &client.controller;
    controller.start(None).await;

    let outcome = controller.submit(&mut draft).await;
    let state = controller.snapshot();
    controller.shutdown().await;
    outcome?;

    if let Some(message) = state.form_message {
        println!("{}", message.text());
    }
    println!();
    print!(
        "{}",
        ResultsList {
            results: &state.results,
            loading: false,
        }
    );
    Ok(())
}

async fn handle_results(workspace: &Path) -> anyhow::Result<()> {
    let client = Client::connect(load_config(workspace)?)?;
    let controller = &client.controller;
    controller.start(None).await;
    let state = controller.snapshot();
    controller.shutdown().await;

    if !state.is_authenticated() {
        anyhow::bail!("Not logged in. Run `zolari auth login` first.");
    }
    if let Some(ref error) = state.error {
        print!("{}", ErrorBanner(error));
    }
    print!(
        "{}",
        ResultsList {
            results: &state.results,
            loading: false,
        }
    );
    Ok(())
}
