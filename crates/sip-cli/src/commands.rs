use std::sync::Arc;

use anyhow::{Context, Result};
use sip_model::RecDefTree;
use tracing::info_span;

use sip_cli::config::SipConfig;
use sip_cli::pipeline::{
    DocumentWriter, MapOutcome, StatsOutcome, compile_runner, gather_stats, load_rec_def_tree,
    load_rec_mapping, map_dump, open_dump, write_stats_to,
};

use crate::cli::{MapArgs, SchemaArgs, StatsArgs};

pub fn run_schema(args: &SchemaArgs) -> Result<Arc<RecDefTree>> {
    let _span = info_span!("schema").entered();
    load_rec_def_tree(&args.rec_def)
}

pub fn run_map(args: &MapArgs, config: SipConfig) -> Result<MapOutcome> {
    let _span = info_span!("map", input = %args.input.display()).entered();
    let config = config
        .with_record_overrides(
            args.records.record_root.as_ref(),
            args.records.unique_element.as_ref(),
        )
        .with_workers(args.workers);
    let tree = load_rec_def_tree(&args.rec_def)?;
    let rec_mapping = load_rec_mapping(&args.mapping, Arc::clone(&tree))?;
    let runner = compile_runner(rec_mapping)?;
    let input = open_dump(&args.input)?;
    let Some(output) = &args.output else {
        return map_dump(&runner, input, &config.parse, &config.runner, |_| Ok(()))
            .with_context(|| format!("map {}", args.input.display()));
    };
    let mut writer = DocumentWriter::create(output, tree.namespaces())?;
    let outcome = map_dump(&runner, input, &config.parse, &config.runner, |document| {
        writer.write(document)
    })
    .with_context(|| format!("map {}", args.input.display()))?;
    writer
        .finish()
        .with_context(|| format!("write {}", output.display()))?;
    println!("Output: {}", output.display());
    Ok(outcome)
}

pub fn run_stats(args: &StatsArgs, config: SipConfig) -> Result<StatsOutcome> {
    let _span = info_span!("stats", input = %args.input.display()).entered();
    let config = config.with_record_overrides(
        args.records.record_root.as_ref(),
        args.records.unique_element.as_ref(),
    );
    let input = open_dump(&args.input)?;
    let outcome = gather_stats(input, &config.parse, config.stats)
        .with_context(|| format!("profile {}", args.input.display()))?;
    if let Some(output) = &args.output {
        write_stats_to(&outcome.stats, output)?;
        println!("Output: {}", output.display());
    }
    Ok(outcome)
}
