//! Checksum values in their wire encoding, shared by the reference service
//! and the scenarios.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use s3conform_core::storage::ChecksumAlgorithm;

/// The base64 `x-amz-checksum-*` value of `data`. CRCs are encoded as their
/// big-endian bytes, digests as-is.
pub fn checksum_of(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    match algorithm {
        ChecksumAlgorithm::Crc32 => STANDARD.encode(crc32fast::hash(data).to_be_bytes()),
        ChecksumAlgorithm::Crc32c => STANDARD.encode(crc32c::crc32c(data).to_be_bytes()),
        ChecksumAlgorithm::Sha1 => STANDARD.encode(Sha1::digest(data)),
        ChecksumAlgorithm::Sha256 => STANDARD.encode(Sha256::digest(data)),
        ChecksumAlgorithm::Crc64Nvme => {
            let mut digest = crc64fast_nvme::Digest::new();
            digest.write(data);
            STANDARD.encode(digest.sum64().to_be_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_of_bar() {
        // crc32("bar") = 0x76ff8caa
        assert_eq!(checksum_of(ChecksumAlgorithm::Crc32, b"bar"), "dv+Mqg==");
    }

    #[test]
    fn test_crc32c_of_bar() {
        // crc32c("bar") = 0x0ab71331
        assert_eq!(checksum_of(ChecksumAlgorithm::Crc32c, b"bar"), "CrcTMQ==");
    }

    #[test]
    fn test_sha1_of_bar() {
        assert_eq!(
            checksum_of(ChecksumAlgorithm::Sha1, b"bar"),
            "Ys23Ag/5IOWqZCw9QGaVDdHwH00="
        );
    }

    #[test]
    fn test_sha256_is_base64_of_digest() {
        assert_eq!(
            checksum_of(ChecksumAlgorithm::Sha256, b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_crc64nvme_of_bar() {
        // crc64nvme("bar") = 0x8a42eceec14c346a
        assert_eq!(checksum_of(ChecksumAlgorithm::Crc64Nvme, b"bar"), "ikLs7sFMNGo=");
    }

    #[test]
    fn test_crc64nvme_check_value() {
        let encoded = checksum_of(ChecksumAlgorithm::Crc64Nvme, b"123456789");
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(bytes, 0xae8b_1486_0a79_9888u64.to_be_bytes());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(checksum_of(ChecksumAlgorithm::Crc32c, b""), "AAAAAA==");
        assert_eq!(checksum_of(ChecksumAlgorithm::Crc64Nvme, b""), "AAAAAAAAAAA=");
    }
}
