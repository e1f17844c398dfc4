use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "robot-cli")]
#[command(about = "Operator CLI for the fleet robot", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
    Status,
}

#[derive(Subcommand)]
enum Commands {
    /// Show lifetime crash report counts without resetting them
    Digest,
    /// Submit a crash report
    Report {
        #[arg(long)]
        server_id: String,
        #[arg(long)]
        short: String,
        #[arg(long, default_value = "")]
        line: String,
        #[arg(long, default_value = "")]
        content: String,
    },
    /// Suspend or resume process liveness checks
    Maintenance {
        #[arg(value_enum)]
        toggle: Toggle,
    },
    /// Reload process descriptors from the catalog database
    Refresh,
    /// Show memory, CPU and disk usage of every host, or of one host
    Summary {
        host: Option<String>,
    },
    /// Stop and start the service in a directory on a host
    Restart {
        host: String,
        dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let request = match cli.command {
        Commands::Digest => client.get(format!("{}/panic", cli.url)),
        Commands::Report {
            server_id,
            short,
            line,
            content,
        } => client.post(format!("{}/panic", cli.url)).json(&json!({
            "ServerID": server_id,
            "Short": short,
            "Line": line,
            "Content": content,
        })),
        Commands::Maintenance { toggle: Toggle::Status } => {
            client.get(format!("{}/maintenance", cli.url))
        }
        Commands::Maintenance { toggle } => client
            .put(format!("{}/maintenance", cli.url))
            .json(&json!({ "enabled": matches!(toggle, Toggle::On) })),
        Commands::Refresh => client.post(format!("{}/catalog/refresh", cli.url)),
        Commands::Summary { host } => {
            let request = client.get(format!("{}/hosts/summary", cli.url));
            match host {
                Some(host) => request.query(&[("host", host)]),
                None => request,
            }
        }
        Commands::Restart { host, dir } => client
            .post(format!("{}/restart", cli.url))
            .json(&json!({ "host": host, "dir": dir })),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: robot returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
