//! Readers for the numpy container formats the trainers persist: `.npy`
//! single arrays and `.npz` archives holding a scipy CSR matrix. An npz
//! archive is a plain zip whose entries are npy files; a CSR matrix is the
//! triple `(indptr, indices, data)` plus a shape.
//!
//! Matrices are kept in CSR form throughout. Densifying happens one row at
//! a time, never for a whole matrix.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::LoadError;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// A decoded npy array: dtype descriptor, shape and raw little-endian data.
#[derive(Debug, Clone)]
pub struct NpyArray {
    pub descr: String,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl NpyArray {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, LoadError> {
        let mut magic = [0u8; 6];
        r.read_exact(&mut magic)?;
        if &magic != NPY_MAGIC {
            return Err(LoadError::Npy("bad magic bytes".to_string()));
        }
        let major = r.read_u8()?;
        let _minor = r.read_u8()?;
        let header_len = match major {
            1 => r.read_u16::<LittleEndian>()? as usize,
            2 | 3 => r.read_u32::<LittleEndian>()? as usize,
            v => return Err(LoadError::Npy(format!("unsupported npy version {v}"))),
        };
        let mut header = vec![0u8; header_len];
        r.read_exact(&mut header)?;
        let header = String::from_utf8_lossy(&header);

        let descr = capture(&header, r"'descr':\s*'([^']+)'")
            .ok_or_else(|| LoadError::Npy("header lacks a descr".to_string()))?;
        if let Some(order) = capture(&header, r"'fortran_order':\s*(True|False)") {
            if order == "True" {
                return Err(LoadError::Npy("fortran-ordered arrays unsupported".to_string()));
            }
        }
        let shape_src = capture(&header, r"'shape':\s*\(([0-9,\s]*)\)")
            .ok_or_else(|| LoadError::Npy("header lacks a shape".to_string()))?;
        let shape: Vec<usize> = shape_src
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| LoadError::Npy(format!("bad shape component '{s}'")))
            })
            .collect::<Result<_, _>>()?;

        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        Ok(NpyArray { descr, shape, data })
    }

    fn element_count(&self) -> usize {
        self.shape.iter().product::<usize>().max(
            // A zero-dimensional array holds one scalar.
            if self.shape.is_empty() { 1 } else { 0 },
        )
    }

    /// Decodes as floats; integer dtypes are widened.
    pub fn as_f64(&self) -> Result<Vec<f64>, LoadError> {
        let n = self.element_count();
        let out: Vec<f64> = match self.descr.as_str() {
            "<f8" => self.data.chunks_exact(8).map(le_f64).collect(),
            "<f4" => self.data.chunks_exact(4).map(le_f32).collect(),
            "<i8" => self.data.chunks_exact(8).map(|c| le_i64(c) as f64).collect(),
            "<i4" => self.data.chunks_exact(4).map(|c| le_i32(c) as f64).collect(),
            other => {
                return Err(LoadError::Npy(format!("unsupported float dtype '{other}'")))
            }
        };
        if out.len() != n {
            return Err(LoadError::Npy(format!(
                "expected {n} elements, found {}",
                out.len()
            )));
        }
        Ok(out)
    }

    pub fn as_i64(&self) -> Result<Vec<i64>, LoadError> {
        let n = self.element_count();
        let out: Vec<i64> = match self.descr.as_str() {
            "<i8" => self.data.chunks_exact(8).map(le_i64).collect(),
            "<i4" => self.data.chunks_exact(4).map(|c| le_i32(c) as i64).collect(),
            other => {
                return Err(LoadError::Npy(format!("unsupported int dtype '{other}'")))
            }
        };
        if out.len() != n {
            return Err(LoadError::Npy(format!(
                "expected {n} elements, found {}",
                out.len()
            )));
        }
        Ok(out)
    }
}

fn capture(header: &str, pattern: &str) -> Option<String> {
    let re = regex::Regex::new(pattern).expect("static pattern");
    re.captures(header).map(|c| c[1].to_string())
}

fn le_f64(c: &[u8]) -> f64 {
    f64::from_le_bytes(c.try_into().unwrap())
}
fn le_f32(c: &[u8]) -> f64 {
    f32::from_le_bytes(c.try_into().unwrap()) as f64
}
fn le_i64(c: &[u8]) -> i64 {
    i64::from_le_bytes(c.try_into().unwrap())
}
fn le_i32(c: &[u8]) -> i32 {
    i32::from_le_bytes(c.try_into().unwrap())
}

/// Reads a single `.npy` file.
pub fn read_npy(path: &Path) -> Result<NpyArray, LoadError> {
    let mut file = File::open(path)?;
    NpyArray::read_from(&mut file)
}

/// A sparse matrix in compressed-sparse-row form, as persisted by the
/// trainers' `save_npz`.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    pub rows: usize,
    pub cols: usize,
    pub indptr: Vec<u64>,
    pub indices: Vec<u64>,
    pub data: Vec<f64>,
}

impl CsrMatrix {
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, LoadError> {
        let mut archive = zip::ZipArchive::new(reader)?;

        if let Ok(mut format) = archive.by_name("format.npy") {
            let mut raw = Vec::new();
            format.read_to_end(&mut raw)?;
            if !raw.windows(3).any(|w| w == b"csr") {
                return Err(LoadError::Npy(
                    "matrix is not in csr format".to_string(),
                ));
            }
        }

        let shape = npz_entry(&mut archive, "shape.npy")?.as_i64()?;
        if shape.len() != 2 {
            return Err(LoadError::Npy(format!(
                "expected a 2-d shape, found {shape:?}"
            )));
        }
        let (rows, cols) = (shape[0] as usize, shape[1] as usize);

        let indptr: Vec<u64> = npz_entry(&mut archive, "indptr.npy")?
            .as_i64()?
            .into_iter()
            .map(|v| v as u64)
            .collect();
        let indices: Vec<u64> = npz_entry(&mut archive, "indices.npy")?
            .as_i64()?
            .into_iter()
            .map(|v| v as u64)
            .collect();
        let data = npz_entry(&mut archive, "data.npy")?.as_f64()?;

        if indptr.len() != rows + 1 {
            return Err(LoadError::Npy(format!(
                "indptr has {} entries for {rows} rows",
                indptr.len()
            )));
        }
        if indptr.last().copied().unwrap_or(0) as usize != data.len()
            || indices.len() != data.len()
        {
            return Err(LoadError::Npy(
                "indices/data lengths disagree with indptr".to_string(),
            ));
        }

        Ok(CsrMatrix {
            rows,
            cols,
            indptr,
            indices,
            data,
        })
    }

    /// The nonzero `(column, value)` slices of row `i`.
    pub fn row(&self, i: usize) -> (&[u64], &[f64]) {
        let lo = self.indptr[i] as usize;
        let hi = self.indptr[i + 1] as usize;
        (&self.indices[lo..hi], &self.data[lo..hi])
    }

    /// Densifies a single row. Only ever call this per-row; whole-matrix
    /// densification is out of bounds by design of the loaders.
    pub fn densify_row(&self, i: usize) -> Vec<f64> {
        let mut out = vec![0.0; self.cols];
        let (cols, vals) = self.row(i);
        for (&c, &v) in cols.iter().zip(vals) {
            out[c as usize] = v;
        }
        out
    }
}

fn npz_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<NpyArray, LoadError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| LoadError::MissingArtifact(name.to_string()))?;
    NpyArray::read_from(&mut entry)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::io::{Cursor, Write};

    pub(crate) fn npy_bytes(descr: &str, shape: &[usize], data: &[u8]) -> Vec<u8> {
        let shape_src = match shape.len() {
            1 => format!("({},)", shape[0]),
            _ => format!(
                "({})",
                shape
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        let mut header = format!(
            "{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape_src}, }}"
        );
        while (header.len() + 11) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut out = Vec::new();
        out.extend_from_slice(NPY_MAGIC);
        out.push(1);
        out.push(0);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        out
    }

    fn le_bytes_i32(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn le_bytes_i64(values: &[i64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn le_bytes_f64(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub(crate) fn csr_npz(
        shape: (usize, usize),
        indptr: &[i64],
        indices: &[i32],
        data: &[f64],
    ) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = zip::write::FileOptions::default();
        let entries = [
            ("format.npy", npy_bytes("|S3", &[], b"csr")),
            (
                "shape.npy",
                npy_bytes("<i8", &[2], &le_bytes_i64(&[shape.0 as i64, shape.1 as i64])),
            ),
            (
                "indptr.npy",
                npy_bytes("<i8", &[indptr.len()], &le_bytes_i64(indptr)),
            ),
            (
                "indices.npy",
                npy_bytes("<i4", &[indices.len()], &le_bytes_i32(indices)),
            ),
            (
                "data.npy",
                npy_bytes("<f8", &[data.len()], &le_bytes_f64(data)),
            ),
        ];
        for (name, bytes) in entries {
            zip.start_file(name, opts).unwrap();
            zip.write_all(&bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn npy_round_trip_f64() {
        let bytes = npy_bytes("<f8", &[3], &le_bytes_f64(&[0.1, 0.2, 0.7]));
        let arr = NpyArray::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(arr.shape, vec![3]);
        assert_eq!(arr.as_f64().unwrap(), vec![0.1, 0.2, 0.7]);
    }

    #[test]
    fn npy_int_widening() {
        let bytes = npy_bytes("<i4", &[2], &le_bytes_i32(&[5, -3]));
        let arr = NpyArray::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(arr.as_i64().unwrap(), vec![5, -3]);
        assert_eq!(arr.as_f64().unwrap(), vec![5.0, -3.0]);
    }

    #[test]
    fn csr_matrix_reads_and_densifies_rows() {
        // [[0.0, 0.4, 0.6],
        //  [1.0, 0.0, 0.0]]
        let bytes = csr_npz((2, 3), &[0, 2, 3], &[1, 2, 0], &[0.4, 0.6, 1.0]);
        let m = CsrMatrix::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!((m.rows, m.cols), (2, 3));
        assert_eq!(m.densify_row(0), vec![0.0, 0.4, 0.6]);
        assert_eq!(m.densify_row(1), vec![1.0, 0.0, 0.0]);
        let (cols, vals) = m.row(1);
        assert_eq!(cols, &[0]);
        assert_eq!(vals, &[1.0]);
    }

    #[test]
    fn mismatched_indptr_is_rejected() {
        let bytes = csr_npz((3, 3), &[0, 1], &[0], &[1.0]);
        assert!(matches!(
            CsrMatrix::from_reader(Cursor::new(bytes)),
            Err(LoadError::Npy(_))
        ));
    }
}
