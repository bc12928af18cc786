// modelvault CLI - command-line client for the modelvault server

mod client;
mod format;

use clap::{Parser, Subcommand};
use colored::Colorize;

use client::ApiClient;
use format::{format_bytes, truncate};

/// modelvault - shared model catalog client
#[derive(Parser)]
#[command(name = "modelvault")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(
        short,
        long,
        global = true,
        env = "MODELVAULT_SERVER",
        default_value = "http://localhost:5000"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all models
    List,
    /// Show one model with its usage statistics
    Get {
        /// Model id (name with '/' replaced by '_')
        #[arg(short, long)]
        id: String,
    },
    /// Download a model from the hub
    Download {
        /// Hub model name, e.g. google/flan-t5-small
        #[arg(short, long)]
        name: String,

        /// Username recorded for the request (defaults to the login name)
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Change the status of a model
    Update {
        /// Model id
        #[arg(short, long)]
        id: String,

        /// New status
        #[arg(long, value_parser = ["ready", "error"])]
        status: String,
    },
    /// Delete a model
    Delete {
        /// Model id
        #[arg(short, long)]
        id: String,
    },
    /// Show system statistics
    Stats,
    /// Check server health
    Health,
}

fn main() {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server);

    let result = match cli.command {
        Commands::List => handle_list(&client),
        Commands::Get { id } => handle_get(&client, &id),
        Commands::Download { name, username } => {
            let username = username.unwrap_or_else(local_username);
            handle_download(&client, &name, &username)
        }
        Commands::Update { id, status } => handle_update(&client, &id, &status),
        Commands::Delete { id } => handle_delete(&client, &id),
        Commands::Stats => handle_stats(&client),
        Commands::Health => handle_health(&client),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Login name from the environment, or `anonymous`.
fn local_username() -> String {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

fn handle_list(client: &ApiClient) -> anyhow::Result<()> {
    let models = client.list_models()?;
    if models.is_empty() {
        println!("No models found");
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<40} {:<12} {:<12} {:<10} {:<20}",
            "NAME", "STATUS", "SIZE", "DOWNLOADS", "FIRST BY"
        )
        .bold()
    );
    println!("{}", "-".repeat(98));

    for model in &models {
        let status = format!("{:<12}", model.status);
        let status = match model.status.as_str() {
            "ready" => status.green(),
            "error" => status.red(),
            _ => status.yellow(),
        };
        println!(
            "{:<40} {} {:<12} {:<10} {:<20}",
            truncate(&model.name, 40),
            status,
            format_bytes(model.size_bytes),
            model.stats.download_count,
            model.stats.first_downloaded_by.as_deref().unwrap_or("N/A"),
        );
    }
    Ok(())
}

fn handle_get(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    let model = client.get_model(id)?;

    println!("{}", "Model Details:".bold());
    println!("  ID:           {}", model.id);
    println!("  Name:         {}", model.name);
    println!("  Status:       {}", model.status);
    println!("  Size:         {}", format_bytes(model.size_bytes));
    println!("  Path:         {}", model.path);
    println!("  Downloaded:   {}", model.downloaded_at);
    if let Some(ref error) = model.error {
        println!("  Error:        {}", error.red());
    }

    let stats = &model.stats;
    println!();
    println!("{}", "Usage Statistics:".bold());
    println!("  Downloads:    {}", stats.download_count);
    println!("  Accesses:     {}", stats.access_count);
    println!("  Total Reqs:   {}", stats.total_requests);
    if let Some(ref first_by) = stats.first_downloaded_by {
        println!("  First By:     {}", first_by.cyan());
        println!(
            "  First From:   {}",
            stats.first_downloaded_from.as_deref().unwrap_or("N/A")
        );
        println!(
            "  First At:     {}",
            stats.first_downloaded_at.as_deref().unwrap_or("N/A")
        );
    }
    Ok(())
}

fn handle_download(client: &ApiClient, name: &str, username: &str) -> anyhow::Result<()> {
    println!("Requesting download of model: {}", name);
    println!("Requester: {}", username);
    println!("{}", "This may take a while...".dimmed());

    let result = client.download_model(name, username)?;
    let model = &result.model;

    println!();
    if result.already_exists {
        println!("{} {}", "✓".green().bold(), "Model already exists".green());
    } else {
        println!("{} {}", "✓".green().bold(), "Model downloaded successfully".green());
    }
    println!("  ID:          {}", model.id);
    println!("  Name:        {}", model.name);
    println!("  Size:        {}", format_bytes(model.size_bytes));
    println!("  Path:        {}", model.path);
    if let Some(ref first_by) = model.stats.first_downloaded_by {
        println!("  First By:    {}", first_by.cyan());
    }
    Ok(())
}

fn handle_update(client: &ApiClient, id: &str, status: &str) -> anyhow::Result<()> {
    let model = client.update_model(id, status, &local_username())?;
    println!("{} {}", "✓".green().bold(), "Model updated successfully".green());
    println!("  ID:          {}", model.id);
    println!("  Status:      {}", model.status);
    Ok(())
}

fn handle_delete(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    println!("Deleting model: {}", id);
    client.delete_model(id, &local_username())?;
    println!("{} {}", "✓".green().bold(), "Model deleted successfully".green());
    Ok(())
}

fn handle_stats(client: &ApiClient) -> anyhow::Result<()> {
    let stats = client.stats()?;

    println!("{}", "System Statistics:".bold());
    println!("  Total Models:    {}", stats.total_models);
    println!("  Total Size:      {}", format_bytes(stats.total_size_bytes));
    println!("  Total Requests:  {}", stats.total_requests);
    println!("  Unique Users:    {}", stats.unique_users);

    if !stats.recent_activity.is_empty() {
        println!();
        println!(
            "{}",
            format!("Recent Activity (last {}):", stats.recent_activity.len()).bold()
        );
        for activity in &stats.recent_activity {
            println!(
                "  - {} by {} from {}",
                activity.action, activity.username, activity.ip_address
            );
        }
    }
    Ok(())
}

fn handle_health(client: &ApiClient) -> anyhow::Result<()> {
    if client.health()? {
        println!("{} {}", "✓".green().bold(), "Server is healthy".green());
        Ok(())
    } else {
        anyhow::bail!("Server is not healthy")
    }
}
