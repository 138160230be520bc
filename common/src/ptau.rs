//! Frozen powers-of-tau catalog.
//!
//! Maps each supported power P to the published parameter file of the
//! perpetual ceremony: maximum constraint count 2^P, the BLAKE2b-512 digest
//! of the file, and its download URL. Selection picks the smallest power
//! whose capacity covers the circuit, clamped to the table's bounds; a
//! circuit above 2^28 constraints cannot be served and aborts pre-flight.

use std::path::Path;

use blake2::{Blake2b512, Digest};

use crate::error::{CeremonyError, Result};

pub const MIN_POWER: u32 = 8;
pub const MAX_POWER: u32 = 28;

/// One entry of the frozen catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtauDescriptor {
    pub power: u32,
    pub max_constraints: u64,
    /// BLAKE2b-512 of the parameter file, lowercase hex.
    pub blake2b_hex: &'static str,
    pub url: &'static str,
}

macro_rules! ptau_entry {
    ($power:literal, $suffix:literal, $digest:literal) => {
        PtauDescriptor {
            power: $power,
            max_constraints: 1u64 << $power,
            blake2b_hex: $digest,
            url: concat!(
                "https://hermez.s3-eu-west-1.amazonaws.com/powersOfTau28_hez_final_",
                $suffix,
                ".ptau"
            ),
        }
    };
}

/// The published parameter files, one per power in [8, 28].
pub const CATALOG: [PtauDescriptor; 21] = [
    ptau_entry!(8, "08", "e5b008ab27cbdf88b7018fe16916552f30b67293632340debc56d54a1ce9739e97715dbc18cc15f6c806e4c39660682864c452543ba4593291c1e279a1bddb03"),
    ptau_entry!(9, "09", "302f3f63a2880bcd620f574a8d3aa3bcf7cbe27032b0a0b5f37978d819fbe791d914cbae06d8a9becff581bf1db267085099121a4efc065ef0060342c8281697"),
    ptau_entry!(10, "10", "db6a0b00310e8867c27751daa7ed37354da52b1155f7045dc09813290db6ecf07e14462b1945d552375092691a1fa25be7a9553c16cf83105bf029dc55b2cda1"),
    ptau_entry!(11, "11", "aeacf73ff9eaa0cd84a3e6c4442c68aefc6a9387722738dc20854dca8b7eef93bb1120d69cb0de8dd1cc58430b972a2914f813affdfb465cdd07e02b3a485988"),
    ptau_entry!(12, "12", "a0399c951f28ab618944f425e1f50c92e34eac44e1ada0efb1fdc521f91a33169d2b702cec13d86d640ab94568e44ae7a80e392612da024d638fd068064b62f5"),
    ptau_entry!(13, "13", "5c1085acaf75bfcba7119e97e1510a1f2955d702b22b2b92299c80af6c1492f77e9e9d5dd1cf1894f13f458a83200eb874639199691ba225896fca537321a3fb"),
    ptau_entry!(14, "14", "a049b05416ec1bad1c4b1ac88eba6f602972aaf5dd07fa779bc74a1c2fdd54af1adbb864d627c3b2b3a25475f70622b5a28a434a0c1cd93b5e25c8833ce5a7bf"),
    ptau_entry!(15, "15", "58cc5c649ff6c89d54923856e9c9743add9bb042210d4af5e7be8dd633e6c60b7cfaca38b203621ba540a3d72115ccc54788314131c312bc28f3b1f9e685250e"),
    ptau_entry!(16, "16", "df6eb54ba52291d206c335dc163398c6bc5c2e5244ac4c5f58a1e3507a7712cac2a0430f97cbff7e39e357b250935ae7111e4e5c08bf1c46098c165e43df02be"),
    ptau_entry!(17, "17", "3aff221892c71ff5cdf90b367706d6859d5674187e48f37ee9132e8b7f70805e86fdefb4961ea75f93bbaa8e849ae25a53f0d42a2b033ab4f51f4c0d6ce8c086"),
    ptau_entry!(18, "18", "85ef7cf526c03549dda34bfbc557aff6fd2a63da4c69df1f06eee8c0c740a693bd9da22cc657aff0ac9b5c9c6157985ca4536a060fa4cf4e4146f5b2bf021f4f"),
    ptau_entry!(19, "19", "348fa50bd6d260bd085d84925b9384b3bfef922906fd9b5f4352d0d692304180c57ff0780de3ee4a917f77bd80d0337b809f663b5be551f833d3d2f3a93bc94c"),
    ptau_entry!(20, "20", "7923b0f175efd13aa24925120ba38ca24c23d55e183b154b44b3d83f2caa9b413abb944f4876d57570f442c7450470938639f60a6e99dca53281a19e7c8e8361"),
    ptau_entry!(21, "21", "7b815b43620f228c2bbd786eccd0c6a4321a6424205ab6a78eb095351a23c43f40b3e77cc472f97bf6471e14eae7e05702e3f325951a5ec09d56504255f56728"),
    ptau_entry!(22, "22", "226553ec05681d879f1739432cc7bd8ad6b7c03fc630537f9a54d723b114cf4bd39934a8432a1138a7f83a8cf16ec082933c009f84834299516e6c338c75af07"),
    ptau_entry!(23, "23", "07fcca4a65bd154c4874c5450585056ae6d043bac66c934f7f574828c439e9b17333f113a520b80a44314735220cd4ad39deba4368ccd99ea93aa7b7c7e6e20f"),
    ptau_entry!(24, "24", "67748846ff0427332fb98333f70c5fe887504d3a879a0d2d94aab56d216068e271309d5bbea2055b60ebdf35991016cfbb250a5b8b5d2849f3992fc3702e77cb"),
    ptau_entry!(25, "25", "b0baa901f60b5a277095a569a2115eb8089a7c322228d92c5ea2b92a81d505140d3180b468b3780a629cdb223432a81749d004de1bc485a99b704e13268706df"),
    ptau_entry!(26, "26", "0093c8d375f486a9564d659ddbf4ae922ee6c6cb635bb978f609f792397f7ea62839e29b075c97451ece6b9783b191ddd92684cef4566a2aaa86f76462c3478e"),
    ptau_entry!(27, "27", "754810bf737d7543abb9817c92f81dd1704b973b85e24a91417c3ca6f6969c494c1f51e7c27e83c431c4c60f42fa6a2bceaa3b15b79a6e6a7e7d30935d10a62e"),
    ptau_entry!(28, "28", "4546ec8c326317a25f4c691fbbef4df6c753f573614d1e7505e5fac0a31e217375c411fa51e1c5a0aeb7a404e1690aa4b4ef8282884ef6e8818692dbadd6acad"),
];

/// Smallest power P with 2^P ≥ `constraints`, clamped to [8, 28].
pub fn required_power(constraints: u64) -> Result<u32> {
    if constraints > 1u64 << MAX_POWER {
        return Err(CeremonyError::Ptau(format!(
            "circuit has {} constraints; the catalog tops out at 2^{}",
            constraints, MAX_POWER
        )));
    }
    let mut power = MIN_POWER;
    while (1u64 << power) < constraints {
        power += 1;
    }
    Ok(power)
}

/// Catalog entry for a power in [8, 28].
pub fn descriptor(power: u32) -> Result<&'static PtauDescriptor> {
    CATALOG
        .iter()
        .find(|d| d.power == power)
        .ok_or_else(|| CeremonyError::Ptau(format!("no catalog entry for power {}", power)))
}

/// Entry selected for a circuit with `constraints` constraints.
pub fn descriptor_for_constraints(constraints: u64) -> Result<&'static PtauDescriptor> {
    descriptor(required_power(constraints)?)
}

/// Recompute the BLAKE2b-512 digest of `path` and require it to match the
/// catalog entry.
pub fn verify_file_digest(path: &Path, expected: &PtauDescriptor) -> Result<()> {
    let mut hasher = Blake2b512::new();
    let mut file = std::fs::File::open(path)
        .map_err(|e| CeremonyError::Ptau(format!("cannot open {}: {}", path.display(), e)))?;
    std::io::copy(&mut file, &mut hasher)
        .map_err(|e| CeremonyError::Ptau(format!("cannot read {}: {}", path.display(), e)))?;
    let actual = hex::encode(hasher.finalize());
    if actual != expected.blake2b_hex {
        return Err(CeremonyError::Ptau(format!(
            "powers-of-tau digest mismatch for 2^{}: expected {}, got {}",
            expected.power, expected.blake2b_hex, actual
        )));
    }
    Ok(())
}

/// Digest helper used when pinning new catalog entries.
pub fn blake2b_hex(bytes: &[u8]) -> String {
    hex::encode(Blake2b512::digest(bytes))
}
