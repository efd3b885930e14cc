//! Statistics over a whole dump and their document form.
//!
//! ```xml
//! <stats records="2">
//!   <record-stats records="2">
//!     <field-count total="2" trimmed="false">
//!       <counter value="1" count="2" percentage="100"/>
//!     </field-count>
//!     <frequency path="/record/title" total="2" trimmed="false">...</frequency>
//!   </record-stats>
//!   <field path="/record/title" total="2" unique="true">
//!     <values total="2" trimmed="false">...</values>
//!     <word-counts total="2" trimmed="false">...</word-counts>
//!     <sample capacity="100" evictions="0">
//!       <value text="Night Watch"/>
//!     </sample>
//!   </field>
//! </stats>
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use sip_model::xml::{document_writer, finish_document, write_declaration, write_event};
use sip_model::{Node, Path};
use tracing::{debug, info, info_span};

use crate::error::{Result, StatsCapacityEvent, StatsError};
use crate::histogram::Histogram;
use crate::options::StatsOptions;
use crate::record_stats::RecordStats;
use crate::sample::Sample;
use crate::value_stats::ValueStats;

/// Field statistics for every source path plus per-record frequencies.
///
/// Feeding is single-threaded; use [`StatsAggregator`](crate::StatsAggregator)
/// to funnel several producers into one instance.
#[derive(Debug)]
pub struct Stats {
    options: StatsOptions,
    fields: BTreeMap<Path, ValueStats>,
    record_stats: RecordStats,
    events: Vec<StatsCapacityEvent>,
    finished: bool,
}

impl Stats {
    pub fn new(options: StatsOptions) -> Self {
        Self {
            record_stats: RecordStats::new(&options),
            options,
            fields: BTreeMap::new(),
            events: Vec::new(),
            finished: false,
        }
    }

    pub fn options(&self) -> &StatsOptions {
        &self.options
    }

    /// Record one value. Blank values are not counted.
    pub fn record_value(&mut self, path: &Path, value: &str) -> Result<()> {
        if self.finished {
            debug!(%path, "value recorded on finished statistics was ignored");
            return Ok(());
        }
        if value.trim().is_empty() {
            return Ok(());
        }
        let seen = self.events.len();
        let options = &self.options;
        self.fields
            .entry(path.clone())
            .or_insert_with(|| ValueStats::new(options))
            .record(path, value, &mut self.events)?;
        self.record_stats.record_field(path);
        self.log_events(seen);
        Ok(())
    }

    /// Close the current record.
    pub fn record_record_end(&mut self) {
        if self.finished {
            return;
        }
        let seen = self.events.len();
        self.record_stats.record_end(&mut self.events);
        self.log_events(seen);
    }

    /// Record every non-empty text and attribute value of one record tree,
    /// then close the record.
    pub fn record_node(&mut self, root: &Node) -> Result<()> {
        let mut values = Vec::new();
        root.visit_values(&mut |path: &Path, value: &str| {
            values.push((path.clone(), value.to_string()));
        })?;
        for (path, value) in &values {
            self.record_value(path, value)?;
        }
        self.record_record_end();
        Ok(())
    }

    fn log_events(&self, from: usize) {
        for event in &self.events[from..] {
            info!(%event, "statistics capacity reached");
        }
    }

    /// Fix every total. Calling it again changes nothing.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        for value_stats in self.fields.values_mut() {
            value_stats.finish();
        }
        self.record_stats.finish();
        self.finished = true;
        info!(
            records = self.record_stats.records(),
            fields = self.fields.len(),
            capacity_events = self.events.len(),
            "statistics finished"
        );
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn records(&self) -> u64 {
        self.record_stats.records()
    }

    pub fn fields(&self) -> &BTreeMap<Path, ValueStats> {
        &self.fields
    }

    pub fn field(&self, path: &Path) -> Option<&ValueStats> {
        self.fields.get(path)
    }

    pub fn record_stats(&self) -> &RecordStats {
        &self.record_stats
    }

    /// Every point where gathering gave up exactness, in order.
    pub fn capacity_events(&self) -> &[StatsCapacityEvent] {
        &self.events
    }

    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = document_writer();
        write_declaration(&mut writer)?;
        self.write_xml(&mut writer)?;
        Ok(finish_document(writer)?)
    }

    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(self.to_xml_string()?.as_bytes())?;
        Ok(())
    }

    fn write_xml(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let records = self.records().to_string();
        let mut root = BytesStart::new("stats");
        root.push_attribute(("records", records.as_str()));
        write_event(writer, Event::Start(root))?;

        let mut start = BytesStart::new("record-stats");
        start.push_attribute(("records", records.as_str()));
        write_event(writer, Event::Start(start))?;
        write_histogram(writer, BytesStart::new("field-count"), self.record_stats.field_count())?;
        for (path, histogram) in self.record_stats.frequencies() {
            let path = path.to_string();
            let mut start = BytesStart::new("frequency");
            start.push_attribute(("path", path.as_str()));
            write_histogram(writer, start, histogram)?;
        }
        write_event(writer, Event::End(BytesEnd::new("record-stats")))?;

        for (path, value_stats) in &self.fields {
            let path = path.to_string();
            let total = value_stats.total().to_string();
            let mut start = BytesStart::new("field");
            start.push_attribute(("path", path.as_str()));
            start.push_attribute(("total", total.as_str()));
            start.push_attribute(("unique", bool_text(value_stats.is_unique())));
            write_event(writer, Event::Start(start))?;
            write_histogram(writer, BytesStart::new("values"), value_stats.values())?;
            write_histogram(writer, BytesStart::new("word-counts"), value_stats.word_counts())?;
            write_sample(writer, value_stats.sample())?;
            write_event(writer, Event::End(BytesEnd::new("field")))?;
        }

        write_event(writer, Event::End(BytesEnd::new("stats")))?;
        Ok(())
    }

    /// Read a written statistics document. The result is finished.
    pub fn read(text: &str) -> Result<Stats> {
        Self::read_with_options(text, StatsOptions::default())
    }

    pub fn read_with_options(text: &str, options: StatsOptions) -> Result<Stats> {
        let _span = info_span!("read_stats").entered();
        let root = Node::parse(text)?;
        if root.tag.prefix().is_some() || root.tag.local_name() != "stats" {
            return Err(StatsError::invalid(format!(
                "root element is <{}>",
                root.tag.qualified_name()
            )));
        }

        let record_stats = match root.elements("record-stats").next() {
            Some(node) => read_record_stats(node, &options)?,
            None => {
                let mut empty = RecordStats::new(&options);
                empty.finish();
                empty
            }
        };

        let mut fields = BTreeMap::new();
        for node in root.elements("field") {
            let path = Path::parse(attribute(node, "path")?)?;
            let values = read_histogram(child(node, "values")?, &options)?;
            let word_counts = read_histogram(child(node, "word-counts")?, &options)?;
            let sample_node = child(node, "sample")?;
            let sample = Sample::restore(
                number(sample_node, "capacity")?,
                options.max_value_length,
                sample_node
                    .elements("value")
                    .map(|value| attribute(value, "text").map(str::to_string))
                    .collect::<Result<Vec<_>>>()?,
                number(sample_node, "evictions")?,
            );
            fields.insert(
                path,
                ValueStats {
                    total: number(node, "total")?,
                    values,
                    word_counts,
                    sample,
                    uniqueness: None,
                    unique: flag(node, "unique")?,
                },
            );
        }
        debug!(fields = fields.len(), "read statistics");

        Ok(Stats {
            options,
            fields,
            record_stats,
            events: Vec::new(),
            finished: true,
        })
    }
}

/// Equal when every field and record histogram agrees. Options and capacity
/// events do not take part.
impl PartialEq for Stats {
    fn eq(&self, other: &Self) -> bool {
        self.finished == other.finished
            && self.fields == other.fields
            && self.record_stats == other.record_stats
    }
}

fn bool_text(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn write_histogram(
    writer: &mut Writer<Vec<u8>>,
    mut start: BytesStart<'_>,
    histogram: &Histogram,
) -> Result<()> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let total = histogram.total().to_string();
    start.push_attribute(("total", total.as_str()));
    start.push_attribute(("trimmed", bool_text(histogram.is_trimmed())));
    let counters = histogram.counters();
    if counters.is_empty() {
        return Ok(write_event(writer, Event::Empty(start))?);
    }
    write_event(writer, Event::Start(start))?;
    for counter in counters {
        let count = counter.count.to_string();
        let percentage = counter.percentage.to_string();
        let mut element = BytesStart::new("counter");
        element.push_attribute(("value", counter.value.as_str()));
        element.push_attribute(("count", count.as_str()));
        element.push_attribute(("percentage", percentage.as_str()));
        write_event(writer, Event::Empty(element))?;
    }
    write_event(writer, Event::End(BytesEnd::new(name.as_str())))?;
    Ok(())
}

fn write_sample(writer: &mut Writer<Vec<u8>>, sample: &Sample) -> Result<()> {
    let capacity = sample.capacity().to_string();
    let evictions = sample.evictions().to_string();
    let mut start = BytesStart::new("sample");
    start.push_attribute(("capacity", capacity.as_str()));
    start.push_attribute(("evictions", evictions.as_str()));
    let values = sample.values();
    if values.is_empty() {
        return Ok(write_event(writer, Event::Empty(start))?);
    }
    write_event(writer, Event::Start(start))?;
    for value in values {
        let mut element = BytesStart::new("value");
        element.push_attribute(("text", value));
        write_event(writer, Event::Empty(element))?;
    }
    write_event(writer, Event::End(BytesEnd::new("sample")))?;
    Ok(())
}

fn attribute<'a>(node: &'a Node, name: &str) -> Result<&'a str> {
    node.plain_attribute(name).ok_or_else(|| {
        StatsError::invalid(format!(
            "<{}> has no '{name}' attribute",
            node.tag.qualified_name()
        ))
    })
}

fn number<T: FromStr>(node: &Node, name: &str) -> Result<T> {
    let text = attribute(node, name)?;
    text.parse()
        .map_err(|_| StatsError::invalid(format!("'{text}' for '{name}' is not a number")))
}

fn flag(node: &Node, name: &str) -> Result<bool> {
    match attribute(node, name)? {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(StatsError::invalid(format!(
            "'{other}' for '{name}' is not true or false"
        ))),
    }
}

fn child<'a>(node: &'a Node, name: &str) -> Result<&'a Node> {
    node.elements(name).next().ok_or_else(|| {
        StatsError::invalid(format!(
            "<{}> has no <{name}> element",
            node.tag.qualified_name()
        ))
    })
}

fn read_histogram(node: &Node, options: &StatsOptions) -> Result<Histogram> {
    let counters = node
        .elements("counter")
        .map(|counter| -> Result<(String, u64)> {
            Ok((attribute(counter, "value")?.to_string(), number(counter, "count")?))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Histogram::restore(
        options.histogram_max_size,
        options.histogram_max_storage,
        counters,
        number(node, "total")?,
        flag(node, "trimmed")?,
    ))
}

fn read_record_stats(node: &Node, options: &StatsOptions) -> Result<RecordStats> {
    let field_count = read_histogram(child(node, "field-count")?, options)?;
    let mut frequencies = BTreeMap::new();
    for frequency in node.elements("frequency") {
        let path = Path::parse(attribute(frequency, "path")?)?;
        frequencies.insert(path, read_histogram(frequency, options)?);
    }
    Ok(RecordStats::with_parts(
        options.histogram_max_size,
        options.histogram_max_storage,
        number(node, "records")?,
        field_count,
        frequencies,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_ignored() {
        let mut stats = Stats::new(StatsOptions::default());
        let path = Path::parse("/record/title").unwrap();
        stats.record_value(&path, "   ").unwrap();
        stats.record_record_end();
        stats.finish();
        assert!(stats.field(&path).is_none());
        assert_eq!(stats.records(), 1);
        assert_eq!(stats.record_stats().field_count().count("0"), 1);
    }

    #[test]
    fn finishing_twice_changes_nothing() {
        let mut stats = Stats::new(StatsOptions::default());
        let path = Path::parse("/record/title").unwrap();
        stats.record_value(&path, "a").unwrap();
        stats.record_record_end();
        stats.finish();
        stats.record_value(&path, "b").unwrap();
        stats.record_record_end();
        stats.finish();
        assert_eq!(stats.records(), 1);
        assert_eq!(stats.field(&path).unwrap().total(), 1);
    }

    #[test]
    fn rejects_other_documents() {
        assert!(matches!(
            Stats::read("<rec-mapping/>"),
            Err(StatsError::InvalidDocument { .. })
        ));
    }
}
