//! Reader for the circom R1CS binary container.
//!
//! Only the header section matters to the ceremony: the constraint count
//! drives powers-of-tau selection. Sections are length-prefixed, so
//! everything else is seeked over without being read.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{CeremonyError, Result};

const MAGIC: [u8; 4] = *b"r1cs";
const SUPPORTED_VERSION: u32 = 1;
const HEADER_SECTION: u32 = 1;

/// Fields of the R1CS header section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct R1csInfo {
    /// Bytes per field element.
    pub field_size: u32,
    pub n_wires: u32,
    pub n_pub_out: u32,
    pub n_pub_in: u32,
    pub n_prv_in: u32,
    pub n_labels: u64,
    pub n_constraints: u32,
}

pub fn read_info(path: &Path) -> Result<R1csInfo> {
    let file = std::fs::File::open(path)
        .map_err(|e| CeremonyError::Circuit(format!("cannot open {}: {}", path.display(), e)))?;
    read_info_from(std::io::BufReader::new(file))
}

pub fn read_info_from<R: Read + Seek>(mut reader: R) -> Result<R1csInfo> {
    let mut magic = [0u8; 4];
    read_exact(&mut reader, &mut magic)?;
    if magic != MAGIC {
        return Err(CeremonyError::Circuit(
            "not an R1CS file (bad magic)".to_string(),
        ));
    }

    let version = read_u32(&mut reader)?;
    if version != SUPPORTED_VERSION {
        return Err(CeremonyError::Circuit(format!(
            "unsupported R1CS version {}",
            version
        )));
    }

    let n_sections = read_u32(&mut reader)?;
    for _ in 0..n_sections {
        let section_type = read_u32(&mut reader)?;
        let section_size = read_u64(&mut reader)?;
        if section_type != HEADER_SECTION {
            reader
                .seek(SeekFrom::Current(section_size as i64))
                .map_err(|e| CeremonyError::Circuit(format!("seek failed: {}", e)))?;
            continue;
        }

        let field_size = read_u32(&mut reader)?;
        // The prime itself is not needed for parameter selection.
        reader
            .seek(SeekFrom::Current(field_size as i64))
            .map_err(|e| CeremonyError::Circuit(format!("seek failed: {}", e)))?;
        let n_wires = read_u32(&mut reader)?;
        let n_pub_out = read_u32(&mut reader)?;
        let n_pub_in = read_u32(&mut reader)?;
        let n_prv_in = read_u32(&mut reader)?;
        let n_labels = read_u64(&mut reader)?;
        let n_constraints = read_u32(&mut reader)?;

        return Ok(R1csInfo {
            field_size,
            n_wires,
            n_pub_out,
            n_pub_in,
            n_prv_in,
            n_labels,
            n_constraints,
        });
    }

    Err(CeremonyError::Circuit(
        "R1CS file has no header section".to_string(),
    ))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|e| CeremonyError::Circuit(format!("truncated R1CS file: {}", e)))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact(reader, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header_section(n_constraints: u32) -> Vec<u8> {
        let field_size = 32u32;
        let mut body = Vec::new();
        body.extend_from_slice(&field_size.to_le_bytes());
        body.extend_from_slice(&[0u8; 32]); // prime
        body.extend_from_slice(&2_000u32.to_le_bytes()); // nWires
        body.extend_from_slice(&1u32.to_le_bytes()); // nPubOut
        body.extend_from_slice(&2u32.to_le_bytes()); // nPubIn
        body.extend_from_slice(&3u32.to_le_bytes()); // nPrvIn
        body.extend_from_slice(&4_000u64.to_le_bytes()); // nLabels
        body.extend_from_slice(&n_constraints.to_le_bytes());
        body
    }

    fn r1cs_bytes(sections: Vec<(u32, Vec<u8>)>) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"r1cs");
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(sections.len() as u32).to_le_bytes());
        for (section_type, body) in sections {
            out.extend_from_slice(&section_type.to_le_bytes());
            out.extend_from_slice(&(body.len() as u64).to_le_bytes());
            out.extend_from_slice(&body);
        }
        out
    }

    #[test]
    fn reads_constraint_count_from_header() {
        let bytes = r1cs_bytes(vec![(1, header_section(1_000))]);
        let info = read_info_from(Cursor::new(bytes)).unwrap();
        assert_eq!(info.n_constraints, 1_000);
        assert_eq!(info.n_wires, 2_000);
        assert_eq!(info.field_size, 32);
    }

    #[test]
    fn skips_leading_sections() {
        // Constraint data often precedes the header on disk.
        let bytes = r1cs_bytes(vec![
            (2, vec![0xAB; 512]),
            (3, vec![0xCD; 64]),
            (1, header_section(65_537)),
        ]);
        let info = read_info_from(Cursor::new(bytes)).unwrap();
        assert_eq!(info.n_constraints, 65_537);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = r1cs_bytes(vec![(1, header_section(10))]);
        bytes[0] = b'x';
        assert!(read_info_from(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = r1cs_bytes(vec![(1, header_section(10))]);
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert!(read_info_from(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn rejects_missing_header() {
        let bytes = r1cs_bytes(vec![(2, vec![0u8; 16])]);
        assert!(read_info_from(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn rejects_truncated_file() {
        let bytes = r1cs_bytes(vec![(1, header_section(10))]);
        assert!(read_info_from(Cursor::new(bytes[..20].to_vec())).is_err());
    }
}
