/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! pixano - import datasets into a library and inspect it

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pixanodb::importers::{
    BopImporter, CocoImporter, DotaImporter, ImageFolderImporter, ImportWriter, Importer, LegacyImporter,
    MediaTransfer,
};
use pixanodb::{DatasetService, Settings};

#[derive(Parser)]
#[command(name = "pixano")]
#[command(about = "PixanoDB dataset library tool")]
struct Cli {
    /// Settings file (TOML); environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Library directory or s3:// URI, overriding the settings
    #[arg(short, long)]
    library: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceFormat {
    Coco,
    Dota,
    Folder,
    Bop,
    Legacy,
}

#[derive(Args)]
struct ImportArgs {
    #[arg(value_enum)]
    format: SourceFormat,

    /// Source directory
    input: PathBuf,

    #[arg(short, long)]
    name: String,

    #[arg(short, long, default_value = "")]
    description: String,

    /// Splits to import; discovered from the source when omitted
    #[arg(short, long, value_delimiter = ',')]
    splits: Option<Vec<String>>,

    #[arg(long, value_enum, default_value_t = MediaTransfer::Copy)]
    transfer: MediaTransfer,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a dataset from a source directory
    Import(ImportArgs),
    /// List the datasets of the library
    List,
    /// Recompute the stats of a dataset
    Stats {
        dataset_id: String,
    },
}

fn build_importer(args: &ImportArgs) -> Result<Box<dyn Importer>> {
    let input = args.input.clone();
    let splits = args.splits.clone();
    let (name, description) = (args.name.as_str(), args.description.as_str());
    let importer: Box<dyn Importer> = match args.format {
        SourceFormat::Coco => Box::new(CocoImporter::new(name, description, input, splits)?),
        SourceFormat::Dota => Box::new(DotaImporter::new(name, description, input, splits)?),
        SourceFormat::Folder => Box::new(ImageFolderImporter::new(name, description, input, splits)?),
        SourceFormat::Bop => Box::new(BopImporter::new(name, description, input, splits)?),
        SourceFormat::Legacy => Box::new(LegacyImporter::new(name, description, input)?),
    };
    Ok(importer)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let settings = match cli.library.as_deref() {
        Some(library) => Settings::load_with_library(cli.config.as_deref(), library),
        None => Settings::load(cli.config.as_deref()),
    }
    .context("loading settings")?;
    let service = DatasetService::new(settings).await.context("opening library")?;

    match cli.command {
        Commands::Import(args) => {
            let importer = build_importer(&args)?;
            let target = service.library().dataset_path(&importer.info().id);
            let writer = ImportWriter::new(Arc::clone(service.library().fs()), args.transfer);
            let dataset = writer
                .import_dataset(importer.as_ref(), &target)
                .await
                .with_context(|| format!("importing {}", args.input.display()))?;
            info!(
                "✅ Imported {} ({} items) into {}",
                dataset.info.id, dataset.info.num_elements, dataset.path
            );
        }
        Commands::List => {
            for info in service.library().list(false, false).await? {
                println!(
                    "{}\t{}\t{} items\t{}",
                    info.id, info.name, info.num_elements, info.estimated_size
                );
            }
        }
        Commands::Stats { dataset_id } => {
            for stat in service.refresh_stats(&dataset_id).await? {
                println!("{}\t{:?}\t{} values", stat.name, stat.kind, stat.total());
            }
        }
    }

    Ok(())
}
