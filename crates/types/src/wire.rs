//! Database wire format for [`DeferredNoteDao`]: a flat concatenation of big-endian field
//! elements and length-prefixed vectors. `note` has no statically known length, so it is
//! encoded as a length-prefixed vector too (see [`write_vector`]/[`read_vector`]) alongside
//! `new_commitments` — without a length prefix on `note` the rest of the buffer could not be
//! parsed unambiguously.

use std::io;

use crate::note::DeferredNoteDao;
use crate::primitives::{ContractAddress, NoteHash, PublicKey, SiloedNullifier, StorageSlot, TxHash};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of buffer while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("trailing bytes after a fully parsed value")]
    TrailingBytes,
}

type Result<T> = std::result::Result<T, WireError>;

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn read_u32(buf: &[u8], cursor: &mut usize, what: &'static str) -> Result<u32> {
    let end = *cursor + 4;
    let bytes = buf
        .get(*cursor..end)
        .ok_or(WireError::UnexpectedEof(what))?;
    *cursor = end;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_exact<'a>(buf: &'a [u8], cursor: &mut usize, len: usize, what: &'static str) -> Result<&'a [u8]> {
    let end = *cursor + len;
    let slice = buf
        .get(*cursor..end)
        .ok_or(WireError::UnexpectedEof(what))?;
    *cursor = end;
    Ok(slice)
}

/// Writes a length-prefixed byte vector: `u32(len) ‖ bytes`.
fn write_vector(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

fn read_vector(buf: &[u8], cursor: &mut usize, what: &'static str) -> Result<Vec<u8>> {
    let len = read_u32(buf, cursor, what)? as usize;
    Ok(read_exact(buf, cursor, len, what)?.to_vec())
}

/// Serializes a value into the documented database wire format.
pub trait ToBuffer {
    fn to_buffer(&self) -> Vec<u8>;
}

/// Deserializes a value from the documented database wire format.
pub trait FromBuffer: Sized {
    fn from_buffer(buf: &[u8]) -> Result<Self>;
}

impl ToBuffer for DeferredNoteDao {
    fn to_buffer(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.public_key.as_bytes());
        write_vector(&mut buf, &self.note);
        buf.extend_from_slice(self.contract_address.as_bytes());
        buf.extend_from_slice(self.storage_slot.as_bytes());
        buf.extend_from_slice(self.tx_hash.as_bytes());
        buf.extend_from_slice(self.tx_nullifier.as_bytes());
        write_u32(&mut buf, self.new_commitments.len() as u32);
        for commitment in &self.new_commitments {
            buf.extend_from_slice(commitment.as_bytes());
        }
        write_u32(&mut buf, self.data_start_index_for_tx as u32);
        buf
    }
}

impl FromBuffer for DeferredNoteDao {
    fn from_buffer(buf: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;

        let public_key = PublicKey::from_slice(read_exact(buf, &mut cursor, PublicKey::LEN, "public_key")?)
            .expect("slice length matches PublicKey::LEN by construction");
        let note = read_vector(buf, &mut cursor, "note")?;
        let contract_address = ContractAddress::from_slice(read_exact(
            buf,
            &mut cursor,
            ContractAddress::LEN,
            "contract_address",
        )?)
        .expect("slice length matches ContractAddress::LEN by construction");
        let storage_slot = StorageSlot::from_slice(read_exact(
            buf,
            &mut cursor,
            StorageSlot::LEN,
            "storage_slot",
        )?)
        .expect("slice length matches StorageSlot::LEN by construction");
        let tx_hash = TxHash::from_slice(read_exact(buf, &mut cursor, TxHash::LEN, "tx_hash")?)
            .expect("slice length matches TxHash::LEN by construction");
        let tx_nullifier = SiloedNullifier::from_slice(read_exact(
            buf,
            &mut cursor,
            SiloedNullifier::LEN,
            "tx_nullifier",
        )?)
        .expect("slice length matches SiloedNullifier::LEN by construction");

        let commitment_count = read_u32(buf, &mut cursor, "new_commitments.len")? as usize;
        let mut new_commitments = Vec::with_capacity(commitment_count);
        for _ in 0..commitment_count {
            let commitment = NoteHash::from_slice(read_exact(
                buf,
                &mut cursor,
                NoteHash::LEN,
                "new_commitments[i]",
            )?)
            .expect("slice length matches NoteHash::LEN by construction");
            new_commitments.push(commitment);
        }

        let data_start_index_for_tx = read_u32(buf, &mut cursor, "data_start_index_for_tx")? as u64;

        if cursor != buf.len() {
            return Err(WireError::TrailingBytes);
        }

        Ok(DeferredNoteDao {
            public_key,
            note,
            contract_address,
            storage_slot,
            tx_hash,
            tx_nullifier,
            new_commitments,
            data_start_index_for_tx,
        })
    }
}

impl From<WireError> for io::Error {
    fn from(err: WireError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err.to_string())
    }
}
