//! Flag control commands against a running generator

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_enabled, format_active_for, print_info, print_success, print_table, OutputFormat};

/// Row for the flags table
#[derive(Tabled, serde::Serialize)]
struct FlagRow {
    #[tabled(rename = "Flag")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Active For")]
    active_for: String,
    #[tabled(rename = "Parent")]
    parent: String,
}

/// List every flag with its state
pub async fn list_flags(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let flags = client.list_flags().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&flags)?);
        }
        OutputFormat::Table => {
            let rows: Vec<FlagRow> = flags
                .into_iter()
                .map(|f| FlagRow {
                    state: color_enabled(f.enabled),
                    active_for: format_active_for(f.duration_secs),
                    parent: f.parent.unwrap_or_else(|| "-".to_string()),
                    name: f.name,
                })
                .collect();
            print_table(&rows, format);
        }
    }
    Ok(())
}

/// Switch a root flag on or off
pub async fn set_flag(client: &ApiClient, name: &str, enabled: bool, format: OutputFormat) -> Result<()> {
    let change = client.set_flag(name, enabled).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&change)?);
        }
        OutputFormat::Table => {
            let state = if change.enabled { "enabled" } else { "disabled" };
            if change.changed {
                print_success(&format!("Flag {} {}", change.flag, state));
            } else {
                print_info(&format!("Flag {} already {}", change.flag, state));
            }
        }
    }
    Ok(())
}
