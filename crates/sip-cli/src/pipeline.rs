//! Stages behind the `sip` subcommands: load, map or gather, write.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path as FsPath;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, unbounded};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use sip_map::{
    CompileOptions, CompileWarning, JobSubmitter, MappingError, MappingResult, MappingRunner,
    MissingFieldsError, ParallelMappingRunner, ParallelOptions, ResultStream, SingleJobResult,
};
use sip_model::xml::{document_writer, write_declaration, write_event};
use sip_model::{MetadataParser, Namespace, ParseError, ParseOptions, RecDefTree, RecMapping};
use sip_stats::{Stats, StatsAggregator, StatsOptions};
use tracing::{debug, info, info_span, warn};

/// Pending events between the dump reader and the statistics thread.
const STATS_QUEUE_CAPACITY: usize = 64;

pub fn load_rec_def_tree(path: &FsPath) -> Result<Arc<RecDefTree>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read record definition {}", path.display()))?;
    let tree = RecDefTree::read(&bytes)
        .with_context(|| format!("parse record definition {}", path.display()))?;
    info!(prefix = tree.prefix(), nodes = tree.len(), "record definition loaded");
    Ok(Arc::new(tree))
}

pub fn load_rec_mapping(path: &FsPath, tree: Arc<RecDefTree>) -> Result<Arc<RecMapping>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read mapping {}", path.display()))?;
    let rec_mapping =
        RecMapping::read(&text, tree).with_context(|| format!("parse mapping {}", path.display()))?;
    info!(
        node_mappings = rec_mapping.node_mappings().len(),
        facts = rec_mapping.facts().len(),
        "mapping loaded"
    );
    Ok(Arc::new(rec_mapping))
}

pub fn open_dump(path: &FsPath) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("open dump {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Compile the crosswalk, logging every generation warning.
pub fn compile_runner(rec_mapping: Arc<RecMapping>) -> Result<MappingRunner> {
    let runner =
        MappingRunner::new(rec_mapping, &CompileOptions::default()).context("compile mapping")?;
    for warning in runner.program().warnings() {
        warn!(%warning, "mapping warning");
    }
    Ok(runner)
}

/// Everything one `map` run produced apart from the documents themselves.
#[derive(Debug, Default)]
pub struct MapOutcome {
    /// Records mapped and handed to the document sink.
    pub mapped: usize,
    pub failures: Vec<MappingError>,
    /// Records dropped by the parser for lack of an identifier.
    pub skipped: Vec<ParseError>,
    pub missing_fields: Vec<MissingFieldsError>,
    pub warnings: Vec<CompileWarning>,
}

impl MapOutcome {
    pub fn records(&self) -> usize {
        self.mapped + self.failures.len() + self.skipped.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty() || !self.skipped.is_empty()
    }

    fn record<F>(&mut self, result: SingleJobResult, sink: &mut F) -> Result<()>
    where
        F: FnMut(&MappingResult) -> Result<()>,
    {
        match result {
            SingleJobResult::Success(document) => {
                if let Err(err) = document.check_missing_fields() {
                    self.missing_fields.push(err);
                }
                sink(&document)?;
                self.mapped += 1;
            }
            SingleJobResult::Failure(err) => {
                warn!(record_id = err.record_id(), error = %err, "record failed to map");
                self.failures.push(err);
            }
        }
        Ok(())
    }
}

/// Puts worker results back into input order.
///
/// The reader announces each identifier before queueing its record, so a
/// result never arrives ahead of its announcement. Only results that overtook
/// a slower record are held.
struct Reorder {
    announced: Receiver<String>,
    expected: VecDeque<String>,
    held: HashMap<String, VecDeque<SingleJobResult>>,
}

impl Reorder {
    fn new(announced: Receiver<String>) -> Self {
        Self {
            announced,
            expected: VecDeque::new(),
            held: HashMap::new(),
        }
    }

    fn push(&mut self, result: SingleJobResult) {
        self.held
            .entry(result.record_id().to_string())
            .or_default()
            .push_back(result);
    }

    /// The next result in input order, once it has arrived.
    fn pop_ready(&mut self) -> Option<SingleJobResult> {
        self.expected.extend(self.announced.try_iter());
        let id = self.expected.front()?;
        let queue = self.held.get_mut(id)?;
        let result = queue.pop_front();
        if queue.is_empty() {
            self.held.remove(id);
        }
        self.expected.pop_front();
        result
    }

    /// Whatever is still held after the stream ended, in the best order known.
    fn into_rest(mut self) -> Vec<SingleJobResult> {
        self.expected.extend(self.announced.try_iter());
        let mut rest = Vec::new();
        for id in self.expected {
            if let Some(queue) = self.held.get_mut(&id) {
                rest.extend(queue.pop_front());
            }
        }
        rest.extend(self.held.into_values().flatten());
        rest
    }
}

/// Stream a dump through the worker pool, handing each mapped document to
/// `sink` in input order.
///
/// Malformed XML aborts the run; a record without an identifier is skipped.
/// An error from `sink` stops the workers and is returned.
pub fn map_dump<R, F>(
    runner: &MappingRunner,
    input: R,
    parse: &ParseOptions,
    parallel: &ParallelOptions,
    mut sink: F,
) -> Result<MapOutcome>
where
    R: BufRead + Send,
    F: FnMut(&MappingResult) -> Result<()>,
{
    let _span = info_span!("map_dump").entered();
    let parser = MetadataParser::new(input, parse.clone());
    let (submitter, results) = ParallelMappingRunner::start(runner, parallel).into_parts();
    let (announce, announced) = unbounded();
    let mut outcome = MapOutcome {
        warnings: runner.program().warnings().to_vec(),
        ..MapOutcome::default()
    };
    let (skipped, consumed) = thread::scope(|scope| {
        let producer = scope.spawn(move || submit_records(parser, submitter, announce));
        let consumed = consume_in_order(results, Reorder::new(announced), &mut outcome, &mut sink);
        (producer.join(), consumed)
    });
    outcome.skipped = skipped.map_err(|_| anyhow!("dump reader panicked"))??;
    consumed?;
    info!(
        documents = outcome.mapped,
        failures = outcome.failures.len(),
        skipped = outcome.skipped.len(),
        incomplete = outcome.missing_fields.len(),
        "mapping finished"
    );
    Ok(outcome)
}

fn consume_in_order<F>(
    results: ResultStream,
    mut reorder: Reorder,
    outcome: &mut MapOutcome,
    sink: &mut F,
) -> Result<()>
where
    F: FnMut(&MappingResult) -> Result<()>,
{
    for result in results {
        reorder.push(result);
        while let Some(result) = reorder.pop_ready() {
            outcome.record(result, sink)?;
        }
    }
    let rest = reorder.into_rest();
    if !rest.is_empty() {
        warn!(results = rest.len(), "results released out of input order");
    }
    for result in rest {
        outcome.record(result, sink)?;
    }
    Ok(())
}

fn submit_records<R: BufRead>(
    parser: MetadataParser<R>,
    submitter: JobSubmitter,
    announce: Sender<String>,
) -> Result<Vec<ParseError>> {
    let mut submitted = 0usize;
    let mut skipped = Vec::new();
    for item in parser {
        match item {
            Ok(record) => {
                if announce.send(record.id.clone()).is_err() || submitter.submit(record).is_err() {
                    warn!("mapping workers stopped before the dump was read");
                    break;
                }
                submitted += 1;
            }
            Err(err @ ParseError::MissingIdentifier { .. }) => {
                debug!(error = %err, "record skipped");
                skipped.push(err);
            }
            Err(err) => {
                submitter.finish();
                return Err(err).context("read metadata dump");
            }
        }
    }
    debug!(records = submitted, "dump read");
    submitter.finish();
    Ok(skipped)
}

/// Streams documents under one `<records>` element that declares the target
/// namespaces. Each document is written through as soon as it is added.
pub struct DocumentWriter<W: Write> {
    out: W,
    xml: Writer<Vec<u8>>,
    /// Root start tag, held back until the first document.
    start: Option<BytesStart<'static>>,
    written: usize,
}

impl DocumentWriter<BufWriter<File>> {
    pub fn create(path: &FsPath, namespaces: &[Namespace]) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Self::new(BufWriter::new(file), namespaces)
    }
}

impl<W: Write> DocumentWriter<W> {
    pub fn new(out: W, namespaces: &[Namespace]) -> Result<Self> {
        let mut xml = document_writer();
        write_declaration(&mut xml)?;
        let mut start = BytesStart::new("records");
        for namespace in namespaces {
            let key = if namespace.prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{}", namespace.prefix)
            };
            start.push_attribute((key.as_str(), namespace.uri.as_str()));
        }
        Ok(Self {
            out,
            xml,
            start: Some(start),
            written: 0,
        })
    }

    pub fn write(&mut self, document: &MappingResult) -> Result<()> {
        if let Some(start) = self.start.take() {
            write_event(&mut self.xml, Event::Start(start))?;
        }
        document.root().write_xml(&mut self.xml, &[])?;
        self.written += 1;
        self.drain()
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Close the root element and hand back the flushed output.
    pub fn finish(mut self) -> Result<W> {
        match self.start.take() {
            Some(start) => write_event(&mut self.xml, Event::Empty(start))?,
            None => write_event(&mut self.xml, Event::End(BytesEnd::new("records")))?,
        }
        self.xml.get_mut().push(b'\n');
        self.drain()?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn drain(&mut self) -> Result<()> {
        let buffer = self.xml.get_mut();
        self.out.write_all(buffer)?;
        buffer.clear();
        Ok(())
    }
}

/// Statistics over one dump.
#[derive(Debug)]
pub struct StatsOutcome {
    pub stats: Stats,
    /// Records profiled although they lack an identifier.
    pub unidentified: Vec<ParseError>,
}

/// Feed every record of a dump to a statistics aggregator, including
/// records without an identifier.
pub fn gather_stats<R: BufRead>(
    input: R,
    parse: &ParseOptions,
    options: StatsOptions,
) -> Result<StatsOutcome> {
    let _span = info_span!("gather_stats").entered();
    let aggregator = StatsAggregator::spawn(options, STATS_QUEUE_CAPACITY)
        .context("start statistics aggregator")?;
    let feeder = aggregator.feeder();
    let mut parser = MetadataParser::new(input, parse.clone()).keep_unidentified();
    for item in parser.by_ref() {
        let record = item.context("read metadata dump")?;
        feeder.record(record.root).context("feed statistics")?;
    }
    drop(feeder);
    let stats = aggregator.finish().context("finish statistics")?;
    info!(
        records = stats.records(),
        fields = stats.fields().len(),
        capacity_events = stats.capacity_events().len(),
        "statistics gathered"
    );
    Ok(StatsOutcome {
        stats,
        unidentified: parser.unidentified().to_vec(),
    })
}

pub fn write_stats_to(stats: &Stats, path: &FsPath) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    stats
        .write(&mut out)
        .with_context(|| format!("write {}", path.display()))?;
    out.flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}
