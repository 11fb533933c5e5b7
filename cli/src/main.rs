//! `jenkins`: call a Jenkins REST endpoint from the shell.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use jenkins_core::config::{ENV_API_TOKEN, ENV_URL, ENV_USER};
use jenkins_core::{ApiClient, ClientConfig, HttpResponse, Payload, RequestOptions};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jenkins", version, about = "Jenkins REST API client")]
struct Cli {
    /// Jenkins base URL
    #[arg(long, env = ENV_URL)]
    url: String,

    #[arg(long, env = ENV_USER)]
    user: String,

    /// API token (not the account password)
    #[arg(long, env = ENV_API_TOKEN, hide_env_values = true)]
    token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// GET a resource; `/api/json` is appended when missing
    Get { path: String },

    /// POST form fields, optionally with a `json` envelope
    Post {
        path: String,

        /// Form field as `key=value`; repeatable
        #[arg(long = "field", short = 'f', value_parser = parse_field)]
        fields: Vec<(String, String)>,

        /// JSON object sent as the `json` form field, crumb included
        #[arg(long)]
        json: Option<String>,
    },

    /// POST a config document such as `config.xml`
    PostConfig {
        path: String,

        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        content_type: Option<String>,
    },

    /// Print the crumb issued to this client
    Crumb,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

fn payload(fields: Vec<(String, String)>, json: Option<&str>) -> Result<Payload> {
    let Some(json) = json else {
        return Ok(Payload::Form(fields));
    };
    let value: serde_json::Value = serde_json::from_str(json).context("--json is not valid JSON")?;
    match value {
        serde_json::Value::Object(json) => Ok(Payload::JsonEnvelope { fields, json }),
        _ => bail!("--json must be a JSON object"),
    }
}

fn print(response: HttpResponse) {
    debug!(status = response.status, url = %response.url, bytes = response.body.len(), "response");
    if !response.body.is_empty() {
        println!("{}", response.body);
    }
}

fn run(cli: Cli) -> Result<()> {
    debug!(url = %cli.url, user = %cli.user, command = ?cli.command, "starting");
    let client = ApiClient::new(ClientConfig::new(cli.url, cli.user, cli.token));
    client.init()?;

    match cli.command {
        Command::Get { path } => print(client.get(&path, RequestOptions::default())?),
        Command::Post { path, fields, json } => {
            let payload = payload(fields, json.as_deref())?;
            print(client.post(&path, payload, RequestOptions::default())?);
        }
        Command::PostConfig {
            path,
            file,
            content_type,
        } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let options = RequestOptions {
                content_type,
                ..RequestOptions::default()
            };
            print(client.post_config(&path, body, options)?);
        }
        Command::Crumb => {
            let crumb = client.crumb().ok_or_else(|| anyhow!("no crumb after init"))?;
            println!("{}: {}", crumb.field, crumb.token);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse())
}
