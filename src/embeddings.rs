use crate::{
    checkpoint::{ByteReader, FieldCodec, StorageKind, put_u32},
    error::{Error, Result},
};

/// Header size: 4 bytes row count + 4 bytes dimension.
const HEADER_SIZE: usize = 8;

/// A growable matrix of fixed-dimension embedding vectors, one row per
/// lemma slot.
///
/// Binary format:
/// - 4 bytes: row count R (u32 LE)
/// - 4 bytes: embedding dimension D (u32 LE)
/// - R * D * 4 bytes: f32 LE values in row-major order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embeddings {
    dimension: usize,
    /// Flat array of f32 values in row-major order: `data[row * dimension + dim]`.
    data: Vec<f32>,
}

impl Embeddings {
    /// Build a matrix from rows that must all share one dimension.
    pub fn from_rows<I, R>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f32]>,
    {
        let mut matrix = Self::default();
        for row in rows {
            matrix.push(row.as_ref())?;
        }
        Ok(matrix)
    }

    /// Check that `row` could be appended without changing the dimension.
    pub fn check(&self, row: &[f32]) -> Result<()> {
        if row.is_empty() {
            return Err(Error::Config("cannot store an empty vector".into()));
        }
        if !self.data.is_empty() && row.len() != self.dimension {
            return Err(Error::Config(format!(
                "vector of dimension {} does not match matrix dimension {}",
                row.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    /// Append a row. The first row fixes the dimension.
    pub fn push(&mut self, row: &[f32]) -> Result<()> {
        self.check(row)?;
        if self.data.is_empty() {
            self.dimension = row.len();
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get the embedding vector stored in a row.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if self.dimension == 0 {
            return None;
        }
        let start = index.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on a zero chunk size.
        self.data.chunks_exact(self.dimension.max(1))
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }
}

impl FieldCodec for Embeddings {
    const KIND: StorageKind = StorageKind::BinarySequence;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out =
            Vec::with_capacity(HEADER_SIZE + std::mem::size_of_val(&*self.data));
        put_u32(&mut out, self.len())?;
        put_u32(&mut out, self.dimension)?;
        out.extend(self.data.iter().flat_map(|value| value.to_le_bytes()));
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut reader = ByteReader::new(bytes);
        let rows = reader.u32()?;
        let dimension = reader.u32()?;
        let payload = reader.rest();

        let expected = rows
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or("matrix size overflows")?;
        if payload.len() != expected {
            return Err(format!(
                "expected {expected} payload bytes for {rows}x{dimension}, found {}",
                payload.len()
            ));
        }
        if rows > 0 && dimension == 0 {
            return Err("non-empty matrix with zero dimension".to_string());
        }

        // The file buffer carries no alignment guarantee for f32.
        let raw: Vec<[u8; 4]> = bytemuck::pod_collect_to_vec(payload);
        let data = raw.into_iter().map(f32::from_le_bytes).collect();

        Ok(Self { dimension, data })
    }
}
