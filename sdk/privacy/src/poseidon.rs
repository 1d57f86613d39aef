use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::PrimeField;

/// Domain tag absorbed before nullifier derivation ("NULL")
pub const NULLIFIER_DOMAIN: u64 = 0x4e554c4c;
/// Domain tag for KYC tree leaves ("KYC")
pub const KYC_LEAF_DOMAIN: u64 = 0x4b5943;

static POSEIDON: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

/// Poseidon configuration shared by the native code and the circuit
///
/// Field: BN254 Fr (254 bits)
/// Rate: 2
/// Capacity: 1
pub fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    POSEIDON.get_or_init(|| {
        let prime_bits: u64 = 254;
        let rate: usize = 2;
        let capacity: usize = 1;

        let full_rounds: u64 = 8;
        let partial_rounds: u64 = 57;
        let alpha: u64 = 5;

        let (ark, mds) =
            find_poseidon_ark_and_mds::<Fr>(prime_bits, rate, full_rounds, partial_rounds, 0);

        PoseidonConfig::new(
            full_rounds as usize,
            partial_rounds as usize,
            alpha,
            mds,
            ark,
            rate,
            capacity,
        )
    })
}

/// Domain tag for public-key derivation ("VeilPK")
pub fn public_key_domain() -> Fr {
    Fr::from_le_bytes_mod_order(b"VeilPK")
}

/// Absorb `inputs` in order and squeeze one element.
pub fn poseidon_hash(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::new(poseidon_config());
    for input in inputs {
        sponge.absorb(input);
    }
    sponge.squeeze_field_elements::<Fr>(1)[0]
}
