use crate::archive::EpsilonArchive;
use crate::problem::ProblemSpec;
use anyhow::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One line per archive entry: decision variables then objectives,
/// space-separated.
pub fn write_listing<W: Write>(w: &mut W, archive: &EpsilonArchive) -> Result<()> {
    for ind in archive.iter() {
        let fields: Vec<String> = ind
            .x
            .iter()
            .chain(ind.f.iter())
            .map(|v| v.to_string())
            .collect();
        writeln!(w, "{}", fields.join(" "))?;
    }
    w.flush()?;
    Ok(())
}

pub struct CsvWriter {
    w: BufWriter<File>,
}

impl CsvWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self { w: BufWriter::new(f) })
    }

    pub fn write_header(&mut self, problem: &ProblemSpec) -> Result<()> {
        let mut cols: Vec<String> = problem.variables().iter().map(|v| v.name.clone()).collect();
        cols.extend((0..problem.num_objectives()).map(|i| format!("f{}", i)));
        cols.extend((0..problem.num_constraints()).map(|i| format!("c{}", i)));
        writeln!(self.w, "{}", cols.join(","))?;
        Ok(())
    }

    pub fn write_archive(&mut self, archive: &EpsilonArchive) -> Result<()> {
        for ind in archive.iter() {
            let row: Vec<String> = ind
                .x
                .iter()
                .chain(&ind.f)
                .chain(&ind.c)
                .map(|v| format!("{:.10e}", v))
                .collect();
            writeln!(self.w, "{}", row.join(","))?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }
}
