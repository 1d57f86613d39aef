use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::{PoseidonConfig, constraints::PoseidonSpongeVar};
use ark_ff::{AdditiveGroup, Field};
use ark_r1cs_std::{
    alloc::AllocVar, boolean::Boolean, fields::fp::FpVar, prelude::*, select::CondSelectGadget,
};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use veil_privacy::{FieldElement, MerklePath};

/// In-circuit counterpart of `veil_privacy::poseidon_hash`
pub fn poseidon_gadget(
    cs: ConstraintSystemRef<Fr>,
    config: &PoseidonConfig<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, config);
    sponge.absorb(&inputs)?;
    let mut result = sponge.squeeze_field_elements(1)?;
    Ok(result.remove(0))
}

/// Allocate a witness constrained to 64 bits.
pub fn alloc_u64(cs: ConstraintSystemRef<Fr>, value: u64) -> Result<FpVar<Fr>, SynthesisError> {
    let mut acc = FpVar::zero();
    let mut coeff = Fr::from(1u64);
    for i in 0..64 {
        let bit = Boolean::new_witness(cs.clone(), || Ok((value >> i) & 1 == 1))?;
        acc = acc + FpVar::from(bit) * FpVar::constant(coeff);
        coeff.double_in_place();
    }
    Ok(acc)
}

/// Walk `path` from `leaf` and return (root, position).
///
/// The position is recomposed from the direction bits so it cannot be
/// chosen independently of the path.
pub fn merkle_root_gadget(
    cs: ConstraintSystemRef<Fr>,
    config: &PoseidonConfig<Fr>,
    leaf: &FpVar<Fr>,
    path: &MerklePath,
) -> Result<(FpVar<Fr>, FpVar<Fr>), SynthesisError> {
    let mut current = leaf.clone();
    let mut position = FpVar::zero();
    let mut coeff = Fr::from(1u64);

    for (sibling_bytes, is_right) in path.siblings.iter().zip(path.path_bits.iter()) {
        let sibling =
            FpVar::new_witness(cs.clone(), || Ok(FieldElement(*sibling_bytes).to_field()))?;
        let is_right_var = Boolean::new_witness(cs.clone(), || Ok(*is_right))?;

        // is_right: hash(sibling, current), else hash(current, sibling)
        let left = FpVar::conditionally_select(&is_right_var, &sibling, &current)?;
        let right = FpVar::conditionally_select(&is_right_var, &current, &sibling)?;
        current = poseidon_gadget(cs.clone(), config, &[left, right])?;

        position = position + FpVar::from(is_right_var) * FpVar::constant(coeff);
        coeff.double_in_place();
    }

    Ok((current, position))
}
