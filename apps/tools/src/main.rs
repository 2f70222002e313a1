use std::path::PathBuf;

use anyhow::Result;
use catalog::Catalog;
use clap::{Parser, Subcommand};
use store::{SheetStoreClient, VoteStore};
use url::Url;

#[derive(Parser, Debug)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the pair catalog in presentation order, flagging defective pairs.
    Scan {
        #[arg(long, default_value = "sample")]
        data_dir: PathBuf,
    },
    /// Verify store connectivity with a fresh sheet read.
    CheckStore {
        #[arg(long)]
        base_url: String,
        #[arg(long, default_value = "Sheet1")]
        sheet: String,
        #[arg(long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scan { data_dir } => {
            let catalog = Catalog::scan(&data_dir)?;
            let mut defective = 0usize;
            for entry in catalog.entries() {
                if entry.is_defective() {
                    defective += 1;
                    println!(
                        "{}\t{} image(s)\tDEFECTIVE (will be auto-skipped)",
                        entry.pair_id,
                        entry.images.len()
                    );
                } else {
                    println!("{}\t{} image(s)", entry.pair_id, entry.images.len());
                }
            }
            println!(
                "{} pair(s), {} defective, {} votable",
                catalog.len(),
                defective,
                catalog.len() - defective
            );
        }
        Command::CheckStore {
            base_url,
            sheet,
            token,
        } => {
            let base = Url::parse(&base_url)?;
            let client = SheetStoreClient::new(base, token);
            let rows = client.read(&sheet, true).await?;
            println!("sheet '{sheet}' reachable, {} existing row(s)", rows.len());
        }
    }

    Ok(())
}
