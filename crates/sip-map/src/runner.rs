//! Compile once, run per record.

use std::sync::Arc;

use sip_model::{MetadataRecord, RecMapping};
use tracing::{debug, debug_span};

use crate::error::{MappingError, Result};
use crate::generator::{CompileOptions, compile};
use crate::program::Program;
use crate::result::MappingResult;

/// A compiled crosswalk ready to map records.
///
/// Cloning copies the compiled program, so each clone can run on its own
/// thread without sharing state.
#[derive(Debug, Clone)]
pub struct MappingRunner {
    rec_mapping: Arc<RecMapping>,
    program: Program,
}

impl MappingRunner {
    pub fn new(rec_mapping: Arc<RecMapping>, options: &CompileOptions) -> Result<Self> {
        let program = compile(&rec_mapping, options)?;
        Ok(Self {
            rec_mapping,
            program,
        })
    }

    pub fn rec_mapping(&self) -> &Arc<RecMapping> {
        &self.rec_mapping
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Map one record. A failure only concerns this record.
    pub fn run(&self, record: &MetadataRecord) -> std::result::Result<MappingResult, MappingError> {
        let _span = debug_span!("run", record_id = %record.id).entered();
        let root = self.program.execute(record).inspect_err(|err| {
            debug!(error = %err, "record failed to map");
        })?;
        Ok(MappingResult::new(
            record.id.clone(),
            root,
            Arc::clone(&self.rec_mapping),
        ))
    }
}
