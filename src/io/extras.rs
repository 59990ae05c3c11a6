//! Spatial diagnostics accumulated record by record.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{Dataset, add_fields, grid_dataset, write_dataset};
use crate::error::Result;
use crate::fields::FieldStore;
use crate::time::ModelTime;
use crate::types::FieldId;

/// Writer for the extras file.
///
/// Each record carries `time_bounds` from the previous record (or the
/// run start) to the record time, so the intervals are contiguous.
#[derive(Debug)]
pub struct ExtrasWriter {
    path: PathBuf,
    fields: Vec<FieldId>,
    dataset: Option<Dataset>,
    last_time: f64,
}

impl ExtrasWriter {
    pub fn new(path: impl Into<PathBuf>, fields: Vec<FieldId>, start: f64) -> Self {
        Self {
            path: path.into(),
            fields,
            dataset: None,
            last_time: start,
        }
    }

    /// Records written so far (rank 0 only; 0 elsewhere).
    pub fn records(&self) -> usize {
        self.dataset.as_ref().map_or(0, Dataset::records)
    }

    /// Append a record at time `t` and rewrite the file. Collective.
    pub fn record(&mut self, store: &FieldStore, time: &ModelTime, t: f64, history: &str) -> Result<()> {
        let mut one = grid_dataset(store.grid(), time, (self.last_time, t))?;
        add_fields(&mut one, store, &self.fields)?;
        self.last_time = t;
        if store.grid().rank() != 0 {
            return Ok(());
        }

        match &mut self.dataset {
            None => self.dataset = Some(one),
            Some(ds) => {
                let values: BTreeMap<String, Vec<f64>> = one
                    .vars
                    .into_iter()
                    .filter(|(_, v)| v.dims.first().map(String::as_str) == Some("time"))
                    .map(|(name, v)| (name, v.data))
                    .collect();
                ds.append_record(&values)?;
            }
        }
        if let Some(ds) = &mut self.dataset {
            ds.set_attr("history", history);
            write_dataset(&self.path, ds)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Var;
    use crate::grid::{Grid, GridParameters};
    use crate::io::read_dataset;
    use crate::time::{Calendar, Date};
    use std::sync::Arc;

    #[test]
    fn test_records_accumulate_with_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extras.bin");
        let grid = Arc::new(Grid::serial(GridParameters::new(4, 3, 1e3, 1e3)).unwrap());
        let mut store = FieldStore::new(grid);
        let thk = store.ensure(Var::Thickness).unwrap();
        let time = ModelTime::new(Calendar::Day360, Date::ymd(1, 1, 1), 0.0, 100.0).unwrap();

        let mut w = ExtrasWriter::new(&path, vec![thk], 0.0);
        w.record(&store, &time, 10.0, "").unwrap();
        store.access_mut(thk).unwrap().fill(5.0);
        w.record(&store, &time, 20.0, "").unwrap();
        assert_eq!(w.records(), 2);

        let ds = read_dataset(&path).unwrap();
        assert_eq!(ds.var("time").unwrap().data, vec![10.0, 20.0]);
        assert_eq!(ds.var("time_bounds").unwrap().data, vec![0.0, 10.0, 10.0, 20.0]);
        assert_eq!(ds.last_record("thk", "extras").unwrap()[0], 5.0);
    }
}
