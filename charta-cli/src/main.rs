//! charta-cli — command-line front-end for the Charta chart-analysis server
//!
//! # Subcommands
//! - `status`                                  — backend + Ollama status
//! - `models`                                  — list installed Ollama models
//! - `extract <image>`                         — upload a chart, print its table
//! - `ask <question> --table <t> --title <t>`  — ask about extracted table data

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "charta-cli",
    version,
    about = "Chart table extraction and Q&A against a Charta server"
)]
struct Cli {
    /// Charta HTTP server URL (overrides CHARTA_HTTP_URL env var)
    #[arg(long, env = "CHARTA_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show backend and Ollama status
    Status,

    /// List installed Ollama models
    Models,

    /// Upload a chart image and print the extracted table
    Extract {
        /// Path to the chart image (png/jpg/jpeg/gif)
        image: PathBuf,

        /// Print the raw JSON response instead of the rendered table
        #[arg(long)]
        json: bool,
    },

    /// Ask a question about previously extracted table data
    Ask {
        /// The question to ask
        question: String,

        /// Table data in pipe-delimited form (from `extract`)
        #[arg(long)]
        table: String,

        /// Chart title
        #[arg(long, default_value = "Chart")]
        title: String,

        /// Model to use (server default when omitted)
        #[arg(long)]
        model: Option<String>,

        /// Append the Q&A pair to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    title: String,
    formatted_table: String,
}

#[derive(Debug, Deserialize)]
struct QuestionResponse {
    answer: String,
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn fail_on_error_status(resp: reqwest::blocking::Response) -> reqwest::blocking::Response {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("charta-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    resp
}

/// Show server and Ollama status via GET /status.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = http_client(10)?;
    let url = format!("{}/status", server);

    let resp = match client.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("charta-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    };
    let resp = fail_on_error_status(resp);
    let body: serde_json::Value = resp.json()?;

    println!("Backend: {}", body["status"].as_str().unwrap_or("unknown"));
    let available = body["ollama_available"].as_bool().unwrap_or(false);
    println!("Ollama:  {}", if available { "available" } else { "unavailable" });
    if let Some(models) = body["available_models"].as_array() {
        let names: Vec<&str> = models.iter().filter_map(|m| m.as_str()).collect();
        println!("Models:  {}", names.join(", "));
    }
    Ok(())
}

/// List installed models via GET /models.
fn do_models(server: &str) -> anyhow::Result<()> {
    let client = http_client(10)?;
    let url = format!("{}/models", server);

    let resp = fail_on_error_status(client.get(&url).send()?);
    let body: serde_json::Value = resp.json()?;
    if let Some(models) = body["models"].as_array() {
        for m in models {
            if let Some(name) = m.as_str() {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

/// Upload a chart image via POST /extract and print the table.
fn do_extract(server: &str, image: &PathBuf, json_output: bool) -> anyhow::Result<()> {
    let filename = image
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "chart.png".to_string());
    let bytes = std::fs::read(image)?;

    // Extraction runs the vision model; allow it time.
    let client = http_client(300)?;
    let url = format!("{}/extract", server);

    let part = reqwest::blocking::multipart::Part::bytes(bytes).file_name(filename);
    let form = reqwest::blocking::multipart::Form::new().part("image", part);

    let resp = fail_on_error_status(client.post(&url).multipart(form).send()?);

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        let body: ExtractResponse = resp.json()?;
        println!("{}", body.title);
        println!("{}", body.formatted_table);
    }
    Ok(())
}

/// Ask a question via POST /question, optionally appending the pair to a file.
fn do_ask(
    server: &str,
    question: &str,
    table: &str,
    title: &str,
    model: Option<&str>,
    save: Option<&PathBuf>,
) -> anyhow::Result<()> {
    // Chart Q&A can take minutes on constrained hardware.
    let client = http_client(440)?;
    let url = format!("{}/question", server);

    let mut payload = serde_json::json!({
        "question": question,
        "table_data": table,
        "title": title,
    });
    if let Some(model) = model {
        payload["model"] = serde_json::json!(model);
    }

    let resp = fail_on_error_status(client.post(&url).json(&payload).send()?);
    let body: QuestionResponse = resp.json()?;

    println!("{}", body.answer);

    if let Some(path) = save {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "Q: {}", question)?;
        writeln!(file, "A: {}\n", body.answer)?;
        eprintln!("charta-cli: saved to {}", path.display());
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Models => do_models(&server),
        Commands::Extract { image, json } => do_extract(&server, &image, json),
        Commands::Ask {
            question,
            table,
            title,
            model,
            save,
        } => do_ask(
            &server,
            &question,
            &table,
            &title,
            model.as_deref(),
            save.as_ref(),
        ),
    };

    if let Err(e) = result {
        eprintln!("charta-cli: {}", e);
        std::process::exit(1);
    }
}
