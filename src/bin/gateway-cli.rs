use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::io::Write;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Command line client for the bus gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Sent as `Authorization: Bearer <token>`.
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a message
    Pub { subject: String, data: String },
    /// Send a request and print the reply
    Req { subject: String, data: String },
    /// Stream messages from a subject (wildcards allowed)
    Sub { subject: String },
    /// Key/value operations
    Kv {
        #[command(subcommand)]
        op: KvOp,
    },
}

#[derive(Subcommand)]
enum KvOp {
    Get { bucket: String, key: String },
    Put { bucket: String, key: String, value: String },
    Del { bucket: String, key: String },
}

/// `orders.created` → `orders/created`
fn subject_path(subject: &str) -> String {
    subject.replace('.', "/")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
    }

    match cli.command {
        Commands::Pub { subject, data } => {
            let res = client
                .post(format!("{}/pub/{}", cli.url, subject_path(&subject)))
                .headers(headers)
                .body(data)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Req { subject, data } => {
            let res = client
                .post(format!("{}/req/{}", cli.url, subject_path(&subject)))
                .headers(headers)
                .body(data)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Sub { subject } => {
            let res = client
                .get(format!("{}/sub/{}", cli.url, subject_path(&subject)))
                .headers(headers)
                .send()
                .await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }
            let mut body = res.bytes_stream();
            let mut stdout = std::io::stdout();
            while let Some(chunk) = body.next().await {
                stdout.write_all(&chunk?)?;
                stdout.flush()?;
            }
        }
        Commands::Kv { op } => {
            let req = match op {
                KvOp::Get { bucket, key } => client.get(format!("{}/kv/{}/{}", cli.url, bucket, key)),
                KvOp::Put { bucket, key, value } => client
                    .put(format!("{}/kv/{}/{}", cli.url, bucket, key))
                    .body(value),
                KvOp::Del { bucket, key } => client.delete(format!("{}/kv/{}/{}", cli.url, bucket, key)),
            };
            let res = req.headers(headers).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }
    if !text.is_empty() {
        println!("{}", text);
    }
    Ok(())
}
