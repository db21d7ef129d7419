use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{PanfillError, Result};

pub const COMBINED_TABLE_FILE_NAME: &str = "new_matchtable.txt";
pub const SOFTCORE_TABLE_FILE_NAME: &str = "new_softtable.txt";
pub const NONCORE_TABLE_FILE_NAME: &str = "new_nontable.txt";
pub const SOFTCORE_PRESENCE_ABSENCE_FILE_NAME: &str = "softcore_pam.txt";
pub const NONCORE_PRESENCE_ABSENCE_FILE_NAME: &str = "noncore_pam.txt";

/// Stable identifier of a cluster: its row index in the input table. All
/// iteration over clusters is in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(pub usize);

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Core,
    Softcore,
    Noncore,
}

/// Strain tag of a protein id of the form `<strain>|<local-id>`.
pub fn strain_of(protein_id: &str) -> &str {
    match protein_id.find('|') {
        Some(i) => &protein_id[..i],
        None => protein_id,
    }
}

/// One row of the cluster table: a label plus one slot per genome column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub label: String,
    slots: Vec<Option<String>>,
}

impl Cluster {
    pub fn new(label: &str, slots: Vec<Option<String>>) -> Cluster {
        Cluster {
            label: label.to_string(),
            slots,
        }
    }

    pub fn slots(&self) -> &[Option<String>] {
        &self.slots
    }

    pub fn size(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Protein ids in slot order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().filter_map(|s| s.as_deref())
    }

    pub fn strains(&self) -> BTreeSet<&str> {
        self.members().map(strain_of).collect()
    }

    pub fn contains(&self, protein_id: &str) -> bool {
        self.members().any(|m| m == protein_id)
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|s| s.is_some())
    }

    fn presence_absence(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .map(|s| if s.is_some() { "1" } else { "0" })
            .collect()
    }
}

/// Clusters partitioned into core, softcore and noncore.
#[derive(Debug, Clone)]
pub struct ClusterTable {
    genome_count: usize,
    empty_marker: String,
    core: BTreeMap<ClusterId, Cluster>,
    softcore: BTreeMap<ClusterId, Cluster>,
    noncore: BTreeMap<ClusterId, Cluster>,
}

impl ClusterTable {
    pub fn from_path(path: &Path, empty_marker: &str) -> Result<ClusterTable> {
        let file = std::fs::File::open(path).map_err(|e| {
            PanfillError::MalformedInput(format!(
                "Failed to open cluster table {}: {}",
                path.display(),
                e
            ))
        })?;
        let table = ClusterTable::from_reader(file, empty_marker)?;
        debug!("Read cluster table {}", path.display());
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, empty_marker: &str) -> Result<ClusterTable> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(reader);

        let mut rows = vec![];
        for record_res in rdr.records() {
            let record = record_res?;
            rows.push(record.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        }
        ClusterTable::load(rows, empty_marker)
    }

    /// Partition rows into core and noncore clusters. The number of genomes
    /// and the strain of each genome column are taken from the first row
    /// without an empty marker.
    pub fn load(rows: Vec<Vec<String>>, empty_marker: &str) -> Result<ClusterTable> {
        let column_strains: Vec<String> = match rows
            .iter()
            .find(|row| !row.iter().skip(1).any(|cell| cell == empty_marker))
        {
            Some(row) => row.iter().skip(1).map(|c| strain_of(c).to_string()).collect(),
            None => {
                return Err(PanfillError::MalformedInput(
                    "no complete (core) row found, so the number of genomes is unknown".to_string(),
                ))
            }
        };
        let genome_count = column_strains.len();
        if genome_count == 0 {
            return Err(PanfillError::MalformedInput(
                "complete row has no genome columns".to_string(),
            ));
        }

        let mut table = ClusterTable {
            genome_count,
            empty_marker: empty_marker.to_string(),
            core: BTreeMap::new(),
            softcore: BTreeMap::new(),
            noncore: BTreeMap::new(),
        };
        let mut seen_labels = BTreeSet::new();
        let mut seen_proteins = BTreeSet::new();

        for (i, row) in rows.into_iter().enumerate() {
            let line = i + 1;
            if row.len() != genome_count + 1 {
                return Err(PanfillError::MalformedInput(format!(
                    "line {} has {} genome columns, expected {}",
                    line,
                    row.len().saturating_sub(1),
                    genome_count
                )));
            }
            let label = &row[0];
            if !seen_labels.insert(label.clone()) {
                return Err(PanfillError::MalformedInput(format!(
                    "cluster id {} appears more than once",
                    label
                )));
            }

            let mut slots = Vec::with_capacity(genome_count);
            let mut strains = BTreeSet::new();
            for (column, cell) in row[1..].iter().enumerate() {
                if cell == empty_marker {
                    slots.push(None);
                    continue;
                }
                if cell.trim().is_empty() {
                    return Err(PanfillError::MalformedInput(format!(
                        "line {} contains a blank cell, expected a protein id or '{}'",
                        line, empty_marker
                    )));
                }
                if strain_of(cell) != column_strains[column] {
                    return Err(PanfillError::MalformedInput(format!(
                        "line {} has protein {} of strain {} in genome column {}, which holds strain {}",
                        line,
                        cell,
                        strain_of(cell),
                        column + 1,
                        column_strains[column]
                    )));
                }
                if !strains.insert(strain_of(cell).to_string()) {
                    return Err(PanfillError::MalformedInput(format!(
                        "cluster {} contains more than one protein from strain {}",
                        label,
                        strain_of(cell)
                    )));
                }
                if !seen_proteins.insert(cell.clone()) {
                    return Err(PanfillError::MalformedInput(format!(
                        "protein {} appears in more than one cluster",
                        cell
                    )));
                }
                slots.push(Some(cell.clone()));
            }

            let cluster = Cluster::new(label, slots);
            match cluster.size() {
                0 => {
                    return Err(PanfillError::MalformedInput(format!(
                        "cluster {} has no members",
                        label
                    )))
                }
                n if n == genome_count => {
                    table.core.insert(ClusterId(i), cluster);
                }
                _ => {
                    table.noncore.insert(ClusterId(i), cluster);
                }
            }
        }

        info!(
            "Found {} genomes, {} core clusters and {} noncore clusters",
            table.genome_count,
            table.core.len(),
            table.noncore.len()
        );
        Ok(table)
    }

    pub fn genome_count(&self) -> usize {
        self.genome_count
    }

    pub fn empty_marker(&self) -> &str {
        &self.empty_marker
    }

    pub fn core(&self) -> &BTreeMap<ClusterId, Cluster> {
        &self.core
    }

    pub fn softcore(&self) -> &BTreeMap<ClusterId, Cluster> {
        &self.softcore
    }

    pub fn noncore(&self) -> &BTreeMap<ClusterId, Cluster> {
        &self.noncore
    }

    /// All proteins held by noncore clusters, i.e. the pool searched in the
    /// current pass.
    pub fn proteins_in_scope(&self) -> Vec<&str> {
        self.noncore.values().flat_map(|c| c.members()).collect()
    }

    /// Replace the slots of a noncore cluster and move it to `destination`.
    pub fn promote(
        &mut self,
        id: ClusterId,
        new_slots: Vec<Option<String>>,
        destination: Category,
    ) -> Result<()> {
        if new_slots.len() != self.genome_count {
            return Err(PanfillError::InternalConsistencyFault(format!(
                "cluster {} given {} slots, expected {}",
                id,
                new_slots.len(),
                self.genome_count
            )));
        }
        let complete = new_slots.iter().all(|s| s.is_some());
        match (destination, complete) {
            (Category::Softcore, true) | (Category::Noncore, false) => {}
            _ => {
                return Err(PanfillError::InternalConsistencyFault(format!(
                    "cannot move cluster {} to {:?} with {} of {} slots filled",
                    id,
                    destination,
                    new_slots.iter().filter(|s| s.is_some()).count(),
                    self.genome_count
                )))
            }
        }

        let mut cluster = self.noncore.remove(&id).ok_or_else(|| {
            PanfillError::InternalConsistencyFault(format!(
                "cluster {} is not a noncore cluster",
                id
            ))
        })?;
        cluster.slots = new_slots;
        match destination {
            Category::Softcore => self.softcore.insert(id, cluster),
            _ => self.noncore.insert(id, cluster),
        };
        Ok(())
    }

    /// Add a noncore cluster without the checks made on load.
    #[cfg(test)]
    pub(crate) fn insert_noncore_unchecked(&mut self, id: ClusterId, cluster: Cluster) {
        self.noncore.insert(id, cluster);
    }

    /// Retire a noncore cluster that has been absorbed by another.
    pub fn remove(&mut self, id: ClusterId) -> Result<Cluster> {
        self.noncore.remove(&id).ok_or_else(|| {
            PanfillError::InternalConsistencyFault(format!(
                "cannot remove cluster {} since it is not a noncore cluster",
                id
            ))
        })
    }

    fn write_clusters<'a, W: Write>(
        &self,
        writer: W,
        clusters: impl Iterator<Item = &'a Cluster>,
    ) -> Result<()> {
        let mut wtr = tab_writer(writer);
        for cluster in clusters {
            let mut record = Vec::with_capacity(self.genome_count + 1);
            record.push(cluster.label.as_str());
            for slot in cluster.slots() {
                record.push(slot.as_deref().unwrap_or(self.empty_marker.as_str()));
            }
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_presence_absence<'a, W: Write>(
        writer: W,
        clusters: impl Iterator<Item = &'a Cluster>,
    ) -> Result<()> {
        let mut wtr = tab_writer(writer);
        for cluster in clusters {
            wtr.write_record(cluster.presence_absence())?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Core, then softcore, then noncore clusters.
    pub fn write_combined_table<W: Write>(&self, writer: W) -> Result<()> {
        self.write_clusters(
            writer,
            self.core
                .values()
                .chain(self.softcore.values())
                .chain(self.noncore.values()),
        )
    }

    pub fn write_softcore_table<W: Write>(&self, writer: W) -> Result<()> {
        self.write_clusters(writer, self.softcore.values())
    }

    pub fn write_noncore_table<W: Write>(&self, writer: W) -> Result<()> {
        self.write_clusters(writer, self.noncore.values())
    }

    pub fn write_softcore_presence_absence<W: Write>(&self, writer: W) -> Result<()> {
        ClusterTable::write_presence_absence(writer, self.softcore.values())
    }

    pub fn write_noncore_presence_absence<W: Write>(&self, writer: W) -> Result<()> {
        ClusterTable::write_presence_absence(writer, self.noncore.values())
    }

    /// Write all output tables into `output_directory`.
    pub fn serialise(&self, output_directory: &Path) -> Result<()> {
        std::fs::create_dir_all(output_directory)?;
        let create = |name: &str| std::fs::File::create(output_directory.join(name));

        self.write_combined_table(create(COMBINED_TABLE_FILE_NAME)?)?;
        self.write_softcore_table(create(SOFTCORE_TABLE_FILE_NAME)?)?;
        self.write_noncore_table(create(NONCORE_TABLE_FILE_NAME)?)?;
        self.write_softcore_presence_absence(create(SOFTCORE_PRESENCE_ABSENCE_FILE_NAME)?)?;
        self.write_noncore_presence_absence(create(NONCORE_PRESENCE_ABSENCE_FILE_NAME)?)?;
        info!("Wrote cluster tables to {}", output_directory.display());
        Ok(())
    }
}

fn tab_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer)
}
