use rand::SeedableRng;
use rand::rngs::StdRng;
use veil_privacy::{FieldElement, MerkleTree, Note, SpendingKey, hash_to_field};
use veil_prover::groth16::{prepare_verifying_key, setup};
use veil_prover::{
    CircuitShape, CircuitWitnessCalculator, Groth16Prover, InputNoteWitness, OutputNoteWitness,
    PrivateInputs, ProverError, WitnessCalculator, WitnessError, verify_proof,
};

const HEIGHT: usize = 4;

fn shape() -> CircuitShape {
    CircuitShape::new(2, 2, false, HEIGHT)
}

/// Two owned notes (70 + 30) paying 60 + 35 with a fee of 5.
fn transfer() -> (PrivateInputs, Vec<FieldElement>) {
    let mut rng = StdRng::seed_from_u64(42);
    let mint = hash_to_field(&[b"test-mint"]);
    let key = SpendingKey::random(&mut rng);
    let owner = key.public_key();

    let mut tree = MerkleTree::new(HEIGHT).unwrap();
    let spent = [
        Note::new(70, owner, mint, &mut rng),
        Note::new(30, owner, mint, &mut rng),
    ];
    let positions: Vec<u64> = spent
        .iter()
        .map(|n| tree.insert(&n.commitment()).unwrap())
        .collect();

    let created = [
        Note::new(60, SpendingKey::random(&mut rng).public_key(), mint, &mut rng),
        Note::new(35, owner, mint, &mut rng),
    ];

    let private = PrivateInputs {
        inputs: spent
            .iter()
            .zip(&positions)
            .map(|(note, pos)| InputNoteWitness {
                value: note.value,
                randomness: note.randomness,
                spending_key: key.0,
                merkle_path: tree.path(*pos).unwrap(),
            })
            .collect(),
        outputs: created
            .iter()
            .map(|note| OutputNoteWitness {
                value: note.value,
                randomness: note.randomness,
                recipient: note.owner,
            })
            .collect(),
        kyc: None,
    };

    let mut public = vec![
        FieldElement(tree.root()),
        FieldElement::ZERO,
        hash_to_field(&[b"ext-data"]),
        FieldElement::from_u64(5),
        mint,
    ];
    for (note, pos) in spent.iter().zip(&positions) {
        public.push(FieldElement(note.nullifier(&key, *pos).0));
    }
    for note in &created {
        public.push(note.commitment().to_field_element());
    }

    (private, public)
}

#[test]
fn witness_generation_is_deterministic() {
    let (private, public) = transfer();
    let calculator = CircuitWitnessCalculator::new(shape());

    let first = calculator.calculate(&private, &public).unwrap();
    let second = calculator.calculate(&private, &public).unwrap();

    assert_eq!(first.to_bytes(), second.to_bytes());
    assert_eq!(first.public_signals(), public);
}

#[test]
fn proof_is_deterministic_and_verifies() {
    let (private, public) = transfer();
    let (pk, vk) = setup(shape(), 7).unwrap();
    let prover = Groth16Prover::new(pk).unwrap();
    let witness = CircuitWitnessCalculator::new(shape())
        .calculate(&private, &public)
        .unwrap();

    let first = prover.prove(&witness).unwrap();
    let second = prover.prove(&witness).unwrap();
    assert_eq!(first, second);

    let pvk = prepare_verifying_key(&vk).unwrap();
    assert!(verify_proof(&pvk, &first, &public).unwrap());

    let mut tampered = public.clone();
    tampered[3] = FieldElement::from_u64(6);
    assert!(!verify_proof(&pvk, &first, &tampered).unwrap());
}

#[test]
fn unbalanced_transfer_is_unsatisfied() {
    let (private, mut public) = transfer();
    // fee raised without changing any note
    public[3] = FieldElement::from_u64(9);

    let err = CircuitWitnessCalculator::new(shape())
        .calculate(&private, &public)
        .unwrap_err();
    assert!(matches!(err, WitnessError::Unsatisfied { .. }));
}

#[test]
fn wrong_nullifier_is_unsatisfied() {
    let (private, mut public) = transfer();
    public[5] = FieldElement::from_u64(1);

    let err = CircuitWitnessCalculator::new(shape())
        .calculate(&private, &public)
        .unwrap_err();
    assert!(matches!(err, WitnessError::Unsatisfied { .. }));
}

#[test]
fn arity_mismatch_is_reported_before_synthesis() {
    let (mut private, public) = transfer();
    private.outputs.pop();

    let err = CircuitWitnessCalculator::new(shape())
        .calculate(&private, &public)
        .unwrap_err();
    assert!(matches!(err, WitnessError::ShapeMismatch { .. }));
}

#[test]
fn key_for_another_shape_is_rejected() {
    let (private, public) = transfer();
    let (pk, _) = setup(CircuitShape::new(1, 1, false, HEIGHT), 7).unwrap();
    let prover = Groth16Prover::new(pk).unwrap();
    let witness = CircuitWitnessCalculator::new(shape())
        .calculate(&private, &public)
        .unwrap();

    assert!(matches!(
        prover.prove(&witness),
        Err(ProverError::WitnessSizeMismatch {
            expected: 7,
            actual: 9
        })
    ));
}
