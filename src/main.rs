use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use gpt_playground::{logging, Config, PanelLayout, PlaygroundClient, Settings};

#[derive(Parser)]
#[command(name = "playground")]
#[command(about = "Chat with a remote text-generation endpoint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Endpoint URL (the action is passed as ?action=...)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Model id to start with
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// System directive sent ahead of every conversation
    #[arg(long, global = true)]
    system_prompt: Option<String>,

    /// Screen layout: single or split
    #[arg(long, global = true)]
    layout: Option<PanelLayout>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat screen (default)
    Chat,
    /// List the models the endpoint offers
    Models,
    /// Check that the endpoint can reach its provider (with --model, test that model)
    Test,
}

impl Cli {
    /// Config file contents with command-line flags laid over them
    fn settings(&self, config_path: &std::path::Path) -> Result<Settings> {
        let mut config = Config::load_from(config_path)?;

        if let Some(api_url) = &self.api_url {
            config.api_url = Some(api_url.clone());
        }
        if let Some(model) = &self.model {
            config.default_model = Some(model.clone());
        }
        if let Some(system_prompt) = &self.system_prompt {
            config.system_prompt = Some(system_prompt.clone());
        }
        if let Some(layout) = self.layout {
            config.layout = Some(layout);
        }

        config.resolve()
    }

    /// Model the connection test asks for. Without `--model` the endpoint
    /// tests its own default.
    fn test_model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let settings = cli.settings(&config_path)?;

    match cli.command.as_ref().unwrap_or(&Commands::Chat) {
        Commands::Chat => {
            logging::init_file(&logging::default_log_path()?)?;
            run_chat(&settings, config_path).await?
        }
        Commands::Models => {
            logging::init_stderr()?;
            list_models(&settings).await?
        }
        Commands::Test => {
            logging::init_stderr()?;
            test_connection(&settings, cli.test_model()).await?
        }
    }

    Ok(())
}

async fn run_chat(settings: &Settings, config_path: PathBuf) -> Result<()> {
    info!(api_url = %settings.api_url, model = %settings.default_model, "starting chat");

    let client = PlaygroundClient::new(&settings.api_url);
    let mut app = App::new(settings, client, Some(config_path));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    app.mount();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
            app.poll_tasks().await;
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    if let Err(err) = &result {
        error!(error = %err, "chat loop failed");
    }
    result
}

async fn list_models(settings: &Settings) -> Result<()> {
    let client = PlaygroundClient::new(&settings.api_url);

    match client.get_models().await {
        Ok(list) => {
            if list.provider.is_empty() {
                println!("\nAvailable models");
            } else {
                println!("\nAvailable models ({})", list.provider);
            }
            println!("{}", "=".repeat(30));

            if list.models.is_empty() {
                println!("No models reported by the endpoint.");
            }
            for model in list.models {
                let marker = if model.id == settings.default_model { "*" } else { "•" };
                match model.description {
                    Some(description) => println!("  {} {} ({}) - {}", marker, model.name, model.id, description),
                    None => println!("  {} {} ({})", marker, model.name, model.id),
                }
            }
            Ok(())
        }
        Err(err) => {
            println!("Error listing models: {}", err);
            println!("Check the endpoint URL: {}", settings.api_url);
            Err(err.into())
        }
    }
}

async fn test_connection(settings: &Settings, model: Option<&str>) -> Result<()> {
    let client = PlaygroundClient::new(&settings.api_url);

    match client.test_connection(model).await {
        Ok(test) => {
            println!("{}", test.message);
            println!("  model:    {}", test.model);
            println!("  response: {}", test.response);
            Ok(())
        }
        Err(err) => {
            println!("Connection test failed: {}", err);
            Err(err.into())
        }
    }
}
