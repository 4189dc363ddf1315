//! Schema-driven atomic persistence of checkpoint bundles.
//!
//! A bundle is a record type whose fields are declared up front in a
//! fingerprint ([`Bundle::FINGERPRINT`]). Each field lives in its own file
//! inside the bundle directory, named `<field>.<ext>` where the extension
//! encodes the field's [`StorageKind`]. Writes go to `<field>.tmp` first and
//! are renamed into place; a `.tmp` file found at load time means a save was
//! interrupted and the bundle is refused with
//! [`Error::CorruptedCheckpoint`].

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::Write,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Serialization kind of a checkpoint field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    BinarySequence,
    BinarySet,
    BinaryMap,
    StructuredText,
    ScalarText,
}

impl StorageKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::BinarySequence => "seq.bin",
            Self::BinarySet => "set.bin",
            Self::BinaryMap => "map.bin",
            Self::StructuredText => "json",
            Self::ScalarText => "txt",
        }
    }
}

/// One entry of a bundle fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: StorageKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: StorageKind) -> Self {
        Self { name, kind }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.kind.extension())
    }

    pub fn temp_name(&self) -> String {
        format!("{}.tmp", self.name)
    }
}

/// A value that can be stored as a single checkpoint field.
///
/// `Default` is the field's zero value: it is what a missing file loads as,
/// and a field equal to it is never written.
pub trait FieldCodec: Default + PartialEq + Sized {
    const KIND: StorageKind;

    fn encode(&self) -> Result<Vec<u8>>;

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String>;
}

/// A statically declared checkpoint record.
pub trait Bundle: Sized {
    const FINGERPRINT: &'static [FieldSpec];

    fn write_fields(&self, writer: &mut FieldWriter<'_>) -> Result<()>;

    fn read_fields(reader: &mut FieldReader<'_>) -> Result<Self>;
}

/// A bundle directory on disk.
#[derive(Debug, Clone)]
pub struct Checkpoint<B> {
    dir: PathBuf,
    _bundle: PhantomData<fn() -> B>,
}

impl<B: Bundle> Checkpoint<B> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _bundle: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist every non-zero field of `bundle`.
    ///
    /// With `overwrite == false`, fields whose file already exists are left
    /// untouched.
    pub fn save(&self, bundle: &B, overwrite: bool) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let mut writer = FieldWriter {
            dir: &self.dir,
            fingerprint: B::FINGERPRINT,
            overwrite,
            written: 0,
        };
        bundle.write_fields(&mut writer)?;

        tracing::trace!(
            dir = %self.dir.display(),
            fields = writer.written,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Reconstruct the bundle. Fields without a file (or every field, when
    /// `overwrite` is set) come back as their zero value.
    pub fn load(&self, overwrite: bool) -> Result<B> {
        let mut reader = FieldReader {
            dir: &self.dir,
            fingerprint: B::FINGERPRINT,
            overwrite,
        };
        B::read_fields(&mut reader)
    }

    /// Whether any declared field has been persisted.
    pub fn exists(&self) -> bool {
        B::FINGERPRINT
            .iter()
            .any(|spec| self.dir.join(spec.file_name()).exists())
    }

    /// Temporary files left behind by interrupted saves.
    pub fn pending_temporaries(&self) -> Vec<PathBuf> {
        B::FINGERPRINT
            .iter()
            .map(|spec| self.dir.join(spec.temp_name()))
            .filter(|path| path.exists())
            .collect()
    }
}

fn lookup(
    fingerprint: &[FieldSpec],
    name: &str,
    kind: StorageKind,
) -> Result<FieldSpec> {
    let spec = fingerprint
        .iter()
        .find(|spec| spec.name == name)
        .copied()
        .ok_or_else(|| {
            Error::Config(format!("field '{name}' is not in the fingerprint"))
        })?;

    if spec.kind != kind {
        return Err(Error::Config(format!(
            "field '{name}' is declared as {:?} but stored as {kind:?}",
            spec.kind
        )));
    }
    Ok(spec)
}

pub struct FieldWriter<'a> {
    dir: &'a Path,
    fingerprint: &'static [FieldSpec],
    overwrite: bool,
    written: usize,
}

impl FieldWriter<'_> {
    pub fn field<T: FieldCodec>(&mut self, name: &str, value: &T) -> Result<()> {
        let spec = lookup(self.fingerprint, name, T::KIND)?;

        if *value == T::default() {
            return Ok(());
        }

        let path = self.dir.join(spec.file_name());
        if !self.overwrite && path.exists() {
            return Ok(());
        }

        let bytes = value.encode()?;
        write_atomic(&path, &self.dir.join(spec.temp_name()), &bytes)?;
        self.written += 1;
        Ok(())
    }
}

pub struct FieldReader<'a> {
    dir: &'a Path,
    fingerprint: &'static [FieldSpec],
    overwrite: bool,
}

impl FieldReader<'_> {
    pub fn field<T: FieldCodec>(&mut self, name: &str) -> Result<T> {
        let spec = lookup(self.fingerprint, name, T::KIND)?;

        if self.overwrite {
            return Ok(T::default());
        }

        let temp = self.dir.join(spec.temp_name());
        if temp.exists() {
            return Err(Error::CorruptedCheckpoint { path: temp });
        }

        let path = self.dir.join(spec.file_name());
        if !path.exists() {
            return Ok(T::default());
        }

        let bytes = std::fs::read(&path)?;
        T::decode(&bytes).map_err(|reason| Error::Codec { path, reason })
    }
}

/// Write `bytes` to `temp`, then replace `path` with it.
fn write_atomic(path: &Path, temp: &Path, bytes: &[u8]) -> Result<()> {
    {
        let mut file = File::create(temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if path.exists() {
        std::fs::remove_file(path)?;
    }
    std::fs::rename(temp, path)?;
    Ok(())
}

// -- Binary framing --
//
// All integers are u32 little-endian; strings are length-prefixed UTF-8.

pub fn put_u32(out: &mut Vec<u8>, value: usize) -> Result<()> {
    let value = u32::try_from(value).map_err(|_| {
        Error::Config(format!("value {value} does not fit the u32 framing"))
    })?;
    out.extend_from_slice(&value.to_le_bytes());
    Ok(())
}

pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn take(
        &mut self,
        len: usize,
    ) -> std::result::Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                format!("truncated: wanted {len} bytes at offset {}", self.pos)
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u32(&mut self) -> std::result::Result<usize, String> {
        let raw = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(raw);
        Ok(u32::from_le_bytes(buf) as usize)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }

    pub fn finish(self) -> std::result::Result<(), String> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(format!(
                "{} trailing bytes",
                self.bytes.len() - self.pos
            ))
        }
    }
}

/// Element encoding used inside binary sequences, sets and maps.
pub trait BinaryValue: Sized {
    fn put(&self, out: &mut Vec<u8>) -> Result<()>;

    fn get(reader: &mut ByteReader<'_>) -> std::result::Result<Self, String>;
}

impl BinaryValue for String {
    fn put(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u32(out, self.len())?;
        out.extend_from_slice(self.as_bytes());
        Ok(())
    }

    fn get(reader: &mut ByteReader<'_>) -> std::result::Result<Self, String> {
        let len = reader.u32()?;
        let raw = reader.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|e| e.to_string())
    }
}

impl BinaryValue for usize {
    fn put(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u32(out, *self)
    }

    fn get(reader: &mut ByteReader<'_>) -> std::result::Result<Self, String> {
        reader.u32()
    }
}

impl<T: BinaryValue> BinaryValue for Vec<T> {
    fn put(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u32(out, self.len())?;
        for item in self {
            item.put(out)?;
        }
        Ok(())
    }

    fn get(reader: &mut ByteReader<'_>) -> std::result::Result<Self, String> {
        let len = reader.u32()?;
        let mut items = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            items.push(T::get(reader)?);
        }
        Ok(items)
    }
}

impl<T: BinaryValue + Ord> BinaryValue for BTreeSet<T> {
    fn put(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u32(out, self.len())?;
        for item in self {
            item.put(out)?;
        }
        Ok(())
    }

    fn get(reader: &mut ByteReader<'_>) -> std::result::Result<Self, String> {
        let len = reader.u32()?;
        let mut items = BTreeSet::new();
        for _ in 0..len {
            if !items.insert(T::get(reader)?) {
                return Err("duplicate set element".to_string());
            }
        }
        Ok(items)
    }
}

impl<T: BinaryValue + PartialEq> FieldCodec for Vec<T> {
    const KIND: StorageKind = StorageKind::BinarySequence;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.put(&mut out)?;
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut reader = ByteReader::new(bytes);
        let value = <Self as BinaryValue>::get(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

impl<T: BinaryValue + Ord> FieldCodec for BTreeSet<T> {
    const KIND: StorageKind = StorageKind::BinarySet;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.put(&mut out)?;
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut reader = ByteReader::new(bytes);
        let value = <Self as BinaryValue>::get(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

impl<V: BinaryValue + PartialEq> FieldCodec for BTreeMap<String, V> {
    const KIND: StorageKind = StorageKind::BinaryMap;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        put_u32(&mut out, self.len())?;
        for (key, value) in self {
            key.put(&mut out)?;
            value.put(&mut out)?;
        }
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut reader = ByteReader::new(bytes);
        let len = reader.u32()?;
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let key = <String as BinaryValue>::get(&mut reader)?;
            let value = V::get(&mut reader)?;
            if map.insert(key, value).is_some() {
                return Err("duplicate map key".to_string());
            }
        }
        reader.finish()?;
        Ok(map)
    }
}

impl FieldCodec for String {
    const KIND: StorageKind = StorageKind::ScalarText;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())
    }
}

/// Implement [`FieldCodec`] as pretty-printed JSON for serde records.
macro_rules! structured_text_field {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::checkpoint::FieldCodec for $ty {
                const KIND: $crate::checkpoint::StorageKind =
                    $crate::checkpoint::StorageKind::StructuredText;

                fn encode(&self) -> $crate::error::Result<Vec<u8>> {
                    Ok(serde_json::to_vec_pretty(self)?)
                }

                fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
                    serde_json::from_slice(bytes).map_err(|e| e.to_string())
                }
            }
        )+
    };
}

pub(crate) use structured_text_field;
