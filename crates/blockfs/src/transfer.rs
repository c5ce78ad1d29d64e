use sha2::{Digest, Sha256};

/// What moved between the host and the volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes: u64,
    pub checksum: [u8; 32],
}

impl TransferReport {
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        Self {
            bytes: data.len() as u64,
            checksum: compute_checksum(data),
        }
    }

    #[must_use]
    pub fn checksum_hex(&self) -> String {
        self.checksum.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// SHA-256 of `data`.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_of_known_payload() {
        let report = TransferReport::of(b"abc");
        assert_eq!(report.bytes, 3);
        assert_eq!(
            report.checksum_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_payload_still_has_digest() {
        let report = TransferReport::of(&[]);
        assert_eq!(report.bytes, 0);
        assert!(report.checksum_hex().starts_with("e3b0c442"));
    }
}
