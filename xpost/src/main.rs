//! xpost - Post one classified ad to several marketplaces

use anyhow::Context;
use clap::Parser;
use libcrosspost::logging::LoggingConfig;
use libcrosspost::{AdData, AutomationManager, Config, Credentials, CrosspostError, PostResult};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::str::FromStr;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "xpost")]
#[command(version, about = "Post a classified ad to several marketplaces")]
#[command(long_about = r#"Post a classified ad to Facebook Marketplace, Craigslist, OfferUp and eBay.

EXAMPLES:
    # Post to every platform listed in the credentials file
    xpost --ad bike.json --credentials creds.json

    # Post to selected platforms only
    xpost --ad bike.json --credentials creds.json --platform craigslist,offerup

    # Read the ad from stdin and print JSON results
    cat bike.json | xpost --ad - --credentials creds.json --format json

    # Watch the browser while it works
    xpost --ad bike.json --credentials creds.json --visible

    # Show platforms and the categories they understand
    xpost --list-platforms

INPUT FILES:
    ad           JSON object: title, description, price, category, location,
                 optional images (URLs), contact and additional_data
    credentials  JSON object keyed by platform name, each with username,
                 password and optional email, phone and additional_data
                 (eBay needs app_id, dev_id, cert_id and user_token)

EXIT CODES:
    0 - Every attempted platform accepted the listing
    1 - At least one platform did not (platforms without credentials are
        skipped and do not count)
    3 - Invalid input (unreadable or malformed ad or credentials file, or
        no credentials for any selected platform)
"#)]
struct Cli {
    /// Ad JSON file, or - for stdin
    #[arg(long, value_name = "FILE", required_unless_present = "list_platforms")]
    ad: Option<String>,

    /// Credentials JSON file keyed by platform
    #[arg(long, value_name = "FILE", required_unless_present = "list_platforms")]
    credentials: Option<String>,

    /// Target specific platform(s) (comma-separated)
    #[arg(short, long, value_name = "PLATFORMS")]
    platform: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    format: String,

    /// Show the browser window instead of running headless
    #[arg(long)]
    visible: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// List supported platforms and their categories, then exit
    #[arg(long)]
    list_platforms: bool,
}

const SKIPPED_MESSAGE: &str = "no credentials supplied";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = CrosspostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(CrosspostError::InvalidInput(format!(
                "Invalid format: '{}'. Valid options: text, json",
                s
            ))),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    LoggingConfig::from_env(cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<CrosspostError>()
        .map(CrosspostError::exit_code)
        .unwrap_or(1)
}

fn invalid_input(error: anyhow::Error) -> CrosspostError {
    CrosspostError::InvalidInput(format!("{:#}", error))
}

fn read_input(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read from stdin")?;
        Ok(content)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))
    }
}

fn load_ad(path: &str) -> anyhow::Result<AdData> {
    let content = read_input(path)?;
    let ad: AdData = serde_json::from_str(&content)
        .with_context(|| format!("Invalid ad JSON in {}", path))?;
    ad.validate()?;
    Ok(ad)
}

fn load_credentials(path: &str) -> anyhow::Result<HashMap<String, Credentials>> {
    let content = read_input(path)?;
    let credentials: HashMap<String, Credentials> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid credentials JSON in {}", path))?;
    Ok(credentials
        .into_iter()
        .map(|(platform, creds)| (platform.trim().to_lowercase(), creds))
        .collect())
}

/// Requested platforms, else the configured default list, else every
/// platform with credentials
fn select_platforms(
    requested: Option<&str>,
    config: &Config,
    credentials: &HashMap<String, Credentials>,
) -> Vec<String> {
    if let Some(list) = requested {
        return list
            .split(',')
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
    }
    if !config.engine.platforms.is_empty() {
        return config.engine.platforms.clone();
    }
    let mut names: Vec<String> = credentials.keys().cloned().collect();
    names.sort();
    names
}

fn list_platforms(manager: &AutomationManager) {
    for platform in manager.registered_platforms() {
        let categories = manager.supported_categories(&platform).unwrap_or_default();
        println!("{}: {}", platform, categories.join(", "));
    }
}

/// Requested platforms missing from the credentials file, deduplicated
fn skipped_platforms(platforms: &[String], credentials: &HashMap<String, Credentials>) -> Vec<String> {
    let mut skipped: Vec<String> = platforms
        .iter()
        .filter(|p| !credentials.contains_key(p.as_str()))
        .cloned()
        .collect();
    skipped.sort();
    skipped.dedup();
    skipped
}

fn print_results(
    results: &BTreeMap<String, PostResult>,
    skipped: &[String],
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let mut json = serde_json::Map::new();
            for (platform, result) in results {
                json.insert(platform.clone(), serde_json::to_value(result)?);
            }
            for platform in skipped {
                json.insert(
                    platform.clone(),
                    serde_json::json!({ "status": "skipped", "message": SKIPPED_MESSAGE }),
                );
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            for platform in skipped {
                println!("{}: skipped ({})", platform, SKIPPED_MESSAGE);
            }
            for (platform, result) in results {
                let detail = result
                    .post_url
                    .as_deref()
                    .or(result.platform_ad_id.as_deref())
                    .or(result.message.as_deref())
                    .unwrap_or("");
                match (&result.error_code, result.retry_after) {
                    (Some(code), _) => println!("{}: {} [{}] {}", platform, result.status, code, detail),
                    (None, Some(retry)) => println!(
                        "{}: {} {} (retry after {})",
                        platform,
                        result.status,
                        detail,
                        humantime::format_duration(retry)
                    ),
                    (None, None) => println!("{}: {} {}", platform, result.status, detail),
                }
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let format: OutputFormat = cli.format.parse()?;

    let mut config = Config::load()?;
    if cli.visible {
        config.engine.headless = false;
        for platform in config.platforms.values_mut() {
            platform.headless = Some(false);
        }
    }
    let manager = AutomationManager::from_config(&config)?;

    if cli.list_platforms {
        list_platforms(&manager);
        return Ok(0);
    }

    let (Some(ad_path), Some(credentials_path)) = (cli.ad.as_deref(), cli.credentials.as_deref())
    else {
        return Err(CrosspostError::InvalidInput(
            "Both --ad and --credentials are required".to_string(),
        )
        .into());
    };
    let ad = load_ad(ad_path).map_err(invalid_input)?;
    let credentials = load_credentials(credentials_path).map_err(invalid_input)?;

    let platforms = select_platforms(cli.platform.as_deref(), &config, &credentials);
    if platforms.is_empty() {
        return Err(CrosspostError::InvalidInput("No platforms selected".to_string()).into());
    }
    let skipped = skipped_platforms(&platforms, &credentials);
    if platforms.iter().all(|p| !credentials.contains_key(p.as_str())) {
        return Err(CrosspostError::InvalidInput(format!(
            "No credentials supplied for {}",
            skipped.join(", ")
        ))
        .into());
    }
    debug!("Posting \"{}\" to {}", ad.title, platforms.join(", "));

    let posted = manager
        .post_to_multiple_platforms(&platforms, &ad, &credentials)
        .await;
    let results: BTreeMap<String, PostResult> = posted.into_iter().collect();

    print_results(&results, &skipped, format)?;

    // Skipped platforms were never attempted and do not count as failures
    let all_succeeded = results.values().all(PostResult::is_success);
    Ok(if all_succeeded { 0 } else { 1 })
}
