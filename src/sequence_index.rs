use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use needletail::FastxReader;

use crate::error::{PanfillError, Result};

/// Protein sequences keyed by the first word of their FASTA header.
#[derive(Debug, Default)]
pub struct SequenceIndex {
    sequences: BTreeMap<String, Vec<u8>>,
}

impl SequenceIndex {
    pub fn from_path(fasta_path: &Path) -> Result<SequenceIndex> {
        info!("Reading protein sequences from {} ..", fasta_path.display());
        let mut reader = needletail::parse_fastx_file(fasta_path).map_err(|e| {
            PanfillError::Fasta(format!("Failed to open {}: {}", fasta_path.display(), e))
        })?;

        let mut index = SequenceIndex::default();
        while let Some(record_res) = reader.next() {
            let record = record_res.map_err(|e| {
                PanfillError::Fasta(format!("Failed to parse {}: {}", fasta_path.display(), e))
            })?;
            let header = String::from_utf8_lossy(record.id());
            let id = header.split_whitespace().next().unwrap_or("").to_string();
            index.insert(id, record.seq().to_vec())?;
        }
        info!("Read {} protein sequences", index.len());
        Ok(index)
    }

    pub fn insert(&mut self, id: String, sequence: Vec<u8>) -> Result<()> {
        if id.is_empty() {
            return Err(PanfillError::Fasta("Found a sequence without an id".to_string()));
        }
        if self.sequences.contains_key(&id) {
            return Err(PanfillError::Fasta(format!(
                "The protein {} was found multiple times",
                id
            )));
        }
        self.sequences.insert(id, sequence);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.sequences.get(id).map(|s| s.as_slice())
    }

    /// Write the named proteins as FASTA, in the given order.
    pub fn write_fasta<W: Write>(&self, ids: &[&str], mut writer: W) -> Result<()> {
        for id in ids {
            let seq = self.get(id).ok_or_else(|| {
                PanfillError::Fasta(format!(
                    "Protein {} from the cluster table is missing from the protein FASTA file",
                    id
                ))
            })?;
            writeln!(writer, ">{}", id)?;
            writer.write_all(seq)?;
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}
