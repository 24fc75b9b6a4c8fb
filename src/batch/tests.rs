//! Unit tests for the batch settlement state machine.

#[cfg(test)]
mod tests {
    use super::super::events::{
        BatchFailedEvent, BatchFinalizationEvent, BatchStartedEvent, TreeNoncesEvent,
        TreeSigningStartedEvent, TreeTxEvent, CONNECTOR_TREE_INDEX, VTXO_TREE_INDEX,
    };
    use super::super::*;
    use crate::error::{ArkError, ArkResult};
    use crate::identity::{Identity, SingleKeyIdentity};
    use crate::psbt_ext::embedded_script;
    use crate::tapscript::{sweep_leaf, TapscriptTemplate};
    use crate::tree::tests::{fan_out_from, fan_out_tree};
    use crate::tree::TxTree;
    use crate::vtxo_script::{ArkadeLeaf, VtxoLeaf, VtxoScriptTree};
    use async_trait::async_trait;
    use bitcoin::absolute::LockTime;
    use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
    use bitcoin::taproot::{LeafVersion, TapLeafHash};
    use bitcoin::transaction::Version;
    use bitcoin::{
        Amount, OutPoint, Psbt, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    };
    use std::collections::BTreeMap;
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};

    const INTENT_ID: &str = "abc";
    /// SHA-256 of "abc"
    const INTENT_HASH: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const BATCH_ID: &str = "batch-1";
    const BATCH_EXPIRY: u64 = 144;

    fn keypair(byte: u8) -> Keypair {
        let secp = Secp256k1::new();
        Keypair::from_secret_key(&secp, &SecretKey::from_slice(&[byte; 32]).unwrap())
    }

    fn x_only(byte: u8) -> XOnlyPublicKey {
        keypair(byte).x_only_public_key().0
    }

    fn txid(byte: u8) -> Txid {
        Txid::from_str(&format!("{:02x}", byte).repeat(32)).unwrap()
    }

    // Collaborator mocks

    struct MockArk {
        info: ServerInfo,
        calls: Mutex<Vec<String>>,
        nonces: Mutex<Vec<(String, String, TreeNonces)>>,
        signatures: Mutex<Vec<(String, String, TreePartialSigs)>>,
        completed: Mutex<Option<(Vec<String>, Option<String>)>>,
    }

    impl MockArk {
        fn new() -> Self {
            Self {
                info: ServerInfo {
                    forfeit_pubkey: hex::encode(keypair(20).public_key().serialize()),
                    forfeit_address: "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".to_string(),
                },
                calls: Mutex::new(Vec::new()),
                nonces: Mutex::new(Vec::new()),
                signatures: Mutex::new(Vec::new()),
                completed: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ArkProvider for MockArk {
        async fn get_info(&self) -> ArkResult<ServerInfo> {
            self.calls.lock().unwrap().push("get_info".to_string());
            Ok(self.info.clone())
        }

        async fn confirm_registration(&self, intent_id: &str) -> ArkResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("confirm_registration:{}", intent_id));
            Ok(())
        }

        async fn submit_tree_nonces(
            &self,
            batch_id: &str,
            pubkey: &str,
            nonces: &TreeNonces,
        ) -> ArkResult<()> {
            self.nonces
                .lock()
                .unwrap()
                .push((batch_id.to_string(), pubkey.to_string(), nonces.clone()));
            Ok(())
        }

        async fn submit_tree_signatures(
            &self,
            batch_id: &str,
            pubkey: &str,
            signatures: &TreePartialSigs,
        ) -> ArkResult<()> {
            self.signatures
                .lock()
                .unwrap()
                .push((batch_id.to_string(), pubkey.to_string(), signatures.clone()));
            Ok(())
        }

        async fn submit_signed_forfeit_txs(
            &self,
            forfeits: &[String],
            commitment_tx: Option<&str>,
        ) -> ArkResult<()> {
            *self.completed.lock().unwrap() =
                Some((forfeits.to_vec(), commitment_tx.map(str::to_string)));
            Ok(())
        }
    }

    struct MockSigner {
        pubkey: XOnlyPublicKey,
        required_nonce_events: usize,
        received_nonce_events: Mutex<usize>,
        initialized: Mutex<Option<(Txid, TapLeafHash, Amount)>>,
    }

    impl MockSigner {
        fn new(required_nonce_events: usize) -> Self {
            Self {
                pubkey: x_only(40),
                required_nonce_events,
                received_nonce_events: Mutex::new(0),
                initialized: Mutex::new(None),
            }
        }

        fn root_txid(&self) -> ArkResult<Txid> {
            self.initialized
                .lock()
                .unwrap()
                .map(|(txid, _, _)| txid)
                .ok_or_else(|| ArkError::missing("signer session"))
        }
    }

    #[async_trait]
    impl TreeSignerSession for MockSigner {
        async fn init(
            &self,
            tree: &TxTree,
            sweep_leaf_hash: TapLeafHash,
            amount: Amount,
        ) -> ArkResult<()> {
            *self.initialized.lock().unwrap() = Some((tree.txid(), sweep_leaf_hash, amount));
            Ok(())
        }

        async fn get_public_key(&self) -> ArkResult<String> {
            Ok(hex::encode(self.pubkey.serialize()))
        }

        async fn get_nonces(&self) -> ArkResult<TreeNonces> {
            Ok(BTreeMap::from([(self.root_txid()?, "nonce".to_string())]))
        }

        async fn aggregated_nonces(
            &self,
            _txid: Txid,
            _nonces: &BTreeMap<String, String>,
        ) -> ArkResult<bool> {
            let mut received = self.received_nonce_events.lock().unwrap();
            *received += 1;
            Ok(*received >= self.required_nonce_events)
        }

        async fn sign(&self) -> ArkResult<TreePartialSigs> {
            Ok(BTreeMap::from([(self.root_txid()?, "partial-sig".to_string())]))
        }
    }

    struct MockIntrospector {
        cosign_commitment: bool,
        requests: Mutex<Vec<FinalizationRequest>>,
    }

    impl MockIntrospector {
        fn new(cosign_commitment: bool) -> Self {
            Self {
                cosign_commitment,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IntrospectorProvider for MockIntrospector {
        async fn submit_finalization(
            &self,
            request: &FinalizationRequest,
        ) -> ArkResult<FinalizationResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let signed_commitment_tx = match (&request.commitment_tx, self.cosign_commitment) {
                (Some(_), true) => Some("cosigned-commitment".to_string()),
                _ => None,
            };
            Ok(FinalizationResponse {
                signed_forfeits: request.forfeits.clone(),
                signed_commitment_tx,
            })
        }
    }

    // Fixtures

    struct Fixture {
        ark: Arc<MockArk>,
        signer: Arc<MockSigner>,
        introspector: Arc<MockIntrospector>,
        settlement: BatchSettlement,
    }

    impl Fixture {
        fn new(inputs: Vec<WalletInput>, required_nonce_events: usize, cosign_commitment: bool) -> Self {
            let ark = Arc::new(MockArk::new());
            let signer = Arc::new(MockSigner::new(required_nonce_events));
            let introspector = Arc::new(MockIntrospector::new(cosign_commitment));
            let identity: Arc<dyn Identity> = Arc::new(SingleKeyIdentity::new(keypair(1).secret_key()));

            let intent = Intent {
                id: INTENT_ID.to_string(),
                proof: "proof-psbt".to_string(),
                message: "register-message".to_string(),
            };
            let settlement = BatchSettlement::new(
                intent,
                inputs,
                identity,
                signer.clone(),
                ark.clone(),
                introspector.clone(),
            );

            Self {
                ark,
                signer,
                introspector,
                settlement,
            }
        }

        fn request(&self) -> Option<FinalizationRequest> {
            self.introspector.requests.lock().unwrap().first().cloned()
        }

        fn completed(&self) -> Option<(Vec<String>, Option<String>)> {
            self.ark.completed.lock().unwrap().clone()
        }
    }

    fn wallet_tree() -> VtxoScriptTree {
        VtxoScriptTree::build(
            vec![VtxoLeaf::Arkade(ArkadeLeaf {
                embedded_script: vec![0xd4, 0x52, 0x87],
                template: TapscriptTemplate::Multisig {
                    pubkeys: vec![x_only(1)],
                },
            })],
            &x_only(30),
        )
        .unwrap()
    }

    fn wallet_input(seed: u8) -> WalletInput {
        WalletInput::from_tree(
            OutPoint::new(txid(seed), 0),
            Amount::from_sat(20_000),
            &wallet_tree(),
            0,
        )
        .unwrap()
    }

    /// Commitment with one foreign input followed by `boarding` inputs
    fn commitment_psbt(boarding: &[&WalletInput], with_outputs: bool) -> Psbt {
        let foreign = TxOut {
            value: Amount::from_sat(5_000),
            script_pubkey: ScriptBuf::new(),
        };
        let outpoints = std::iter::once(OutPoint::new(txid(0xee), 3))
            .chain(boarding.iter().map(|input| input.outpoint));

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: outpoints
                .map(|previous_output| TxIn {
                    previous_output,
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::default(),
                })
                .collect(),
            output: if with_outputs {
                vec![
                    TxOut {
                        value: Amount::from_sat(100_000),
                        script_pubkey: ScriptBuf::new(),
                    },
                    TxOut {
                        value: Amount::from_sat(3_000),
                        script_pubkey: ScriptBuf::new(),
                    },
                ]
            } else {
                Vec::new()
            },
        };

        let mut psbt = Psbt::from_unsigned_tx(tx).unwrap();
        psbt.inputs[0].witness_utxo = Some(foreign);
        for (i, input) in boarding.iter().enumerate() {
            psbt.inputs[i + 1].witness_utxo = Some(input.prevout.clone());
        }
        psbt
    }

    fn started_event(hashes: Vec<&str>) -> BatchStartedEvent {
        BatchStartedEvent {
            id: BATCH_ID.to_string(),
            intent_id_hashes: hashes.into_iter().map(str::to_string).collect(),
            batch_expiry: BATCH_EXPIRY,
        }
    }

    fn signing_event(commitment: &Psbt, cosigners: Vec<String>) -> TreeSigningStartedEvent {
        TreeSigningStartedEvent {
            id: BATCH_ID.to_string(),
            unsigned_commitment_tx: commitment.to_string(),
            cosigners_pubkeys: cosigners,
        }
    }

    fn nonces_event(txid: Txid) -> TreeNoncesEvent {
        TreeNoncesEvent {
            id: BATCH_ID.to_string(),
            txid,
            nonces: BTreeMap::from([("02aa".to_string(), "66bb".to_string())]),
        }
    }

    fn finalization_event(commitment: &Psbt) -> BatchFinalizationEvent {
        BatchFinalizationEvent {
            id: BATCH_ID.to_string(),
            commitment_tx: commitment.to_string(),
        }
    }

    /// Signer's key in compressed form, as the coordinator lists it
    fn signer_cosigner_key() -> String {
        hex::encode(keypair(40).public_key().serialize())
    }

    async fn drive_to_signed(fixture: &mut Fixture, commitment: &Psbt) -> TxTree {
        let skipped = fixture
            .settlement
            .on_batch_started(&started_event(vec![INTENT_HASH]))
            .await
            .unwrap();
        assert!(!skipped);

        let vtxo_tree = fan_out_from(OutPoint::new(commitment.unsigned_tx.compute_txid(), 0), 2);
        let skipped = fixture
            .settlement
            .on_tree_signing_started(&signing_event(commitment, vec![signer_cosigner_key()]), &vtxo_tree)
            .await
            .unwrap();
        assert!(!skipped);

        let signed = fixture
            .settlement
            .on_tree_nonces(&nonces_event(vtxo_tree.txid()))
            .await
            .unwrap();
        assert!(signed);
        assert_eq!(fixture.settlement.phase(), Phase::Signed);
        vtxo_tree
    }

    fn signed_input_indices(psbt: &Psbt) -> Vec<usize> {
        psbt.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| !input.tap_script_sigs.is_empty())
            .map(|(index, _)| index)
            .collect()
    }

    // Phase 1

    #[tokio::test]
    async fn test_skip_when_intent_not_admitted() {
        let mut fixture = Fixture::new(vec![], 1, false);

        let skipped = fixture
            .settlement
            .on_batch_started(&started_event(vec![]))
            .await
            .unwrap();

        assert!(skipped);
        assert_eq!(fixture.settlement.phase(), Phase::Skipped);
        assert!(fixture.ark.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registration_stores_sweep_leaf() {
        let mut fixture = Fixture::new(vec![], 1, false);
        let upper_hash = INTENT_HASH.to_uppercase();

        let skipped = fixture
            .settlement
            .on_batch_started(&started_event(vec!["00", upper_hash.as_str()]))
            .await
            .unwrap();

        assert!(!skipped);
        assert_eq!(fixture.settlement.phase(), Phase::Registered);
        assert_eq!(
            *fixture.ark.calls.lock().unwrap(),
            vec!["confirm_registration:abc".to_string(), "get_info".to_string()]
        );

        let sweep = sweep_leaf(x_only(20), BATCH_EXPIRY).unwrap();
        let session = fixture.settlement.session();
        assert_eq!(session.batch_id(), Some(BATCH_ID));
        assert_eq!(
            session.sweep_leaf_hash(),
            Some(TapLeafHash::from_script(&sweep, LeafVersion::TapScript))
        );
    }

    // Phase 2

    #[tokio::test]
    async fn test_skip_when_not_cosigner() {
        let mut fixture = Fixture::new(vec![], 1, false);
        let commitment = commitment_psbt(&[], true);
        fixture
            .settlement
            .on_batch_started(&started_event(vec![INTENT_HASH]))
            .await
            .unwrap();

        let tree = fan_out_tree(3, 1);
        let other = hex::encode(x_only(41).serialize());
        let skipped = fixture
            .settlement
            .on_tree_signing_started(&signing_event(&commitment, vec![other]), &tree)
            .await
            .unwrap();

        assert!(skipped);
        assert_eq!(fixture.settlement.phase(), Phase::Skipped);
        assert!(fixture.ark.nonces.lock().unwrap().is_empty());
        assert!(fixture.signer.initialized.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tree_signing_submits_nonces() {
        let mut fixture = Fixture::new(vec![], 1, false);
        let commitment = commitment_psbt(&[], true);
        fixture
            .settlement
            .on_batch_started(&started_event(vec![INTENT_HASH]))
            .await
            .unwrap();

        let tree = fan_out_tree(3, 2);
        let skipped = fixture
            .settlement
            .on_tree_signing_started(&signing_event(&commitment, vec![signer_cosigner_key()]), &tree)
            .await
            .unwrap();

        assert!(!skipped);
        assert_eq!(fixture.settlement.phase(), Phase::TreeSigning);

        let (root, sweep_hash, amount) = fixture.signer.initialized.lock().unwrap().unwrap();
        assert_eq!(root, tree.txid());
        assert_eq!(Some(sweep_hash), fixture.settlement.session().sweep_leaf_hash());
        assert_eq!(amount, Amount::from_sat(100_000));

        let nonces = fixture.ark.nonces.lock().unwrap();
        assert_eq!(nonces.len(), 1);
        assert_eq!(nonces[0].0, BATCH_ID);
        assert_eq!(nonces[0].1, hex::encode(x_only(40).serialize()));
        assert!(nonces[0].2.contains_key(&tree.txid()));
    }

    #[tokio::test]
    async fn test_missing_shared_output_is_fatal() {
        let mut fixture = Fixture::new(vec![], 1, false);
        let commitment = commitment_psbt(&[], false);
        fixture
            .settlement
            .on_batch_started(&started_event(vec![INTENT_HASH]))
            .await
            .unwrap();

        let result = fixture
            .settlement
            .on_tree_signing_started(
                &signing_event(&commitment, vec![signer_cosigner_key()]),
                &fan_out_tree(3, 1),
            )
            .await;

        assert!(matches!(result, Err(ArkError::MissingData { .. })));
        assert!(fixture.ark.nonces.lock().unwrap().is_empty());
    }

    // Phase 3

    #[tokio::test]
    async fn test_nonces_pending_until_complete() {
        let mut fixture = Fixture::new(vec![], 3, false);
        let commitment = commitment_psbt(&[], true);
        fixture
            .settlement
            .on_batch_started(&started_event(vec![INTENT_HASH]))
            .await
            .unwrap();
        let tree = fan_out_tree(3, 2);
        fixture
            .settlement
            .on_tree_signing_started(&signing_event(&commitment, vec![signer_cosigner_key()]), &tree)
            .await
            .unwrap();

        for _ in 0..2 {
            let signed = fixture
                .settlement
                .on_tree_nonces(&nonces_event(tree.txid()))
                .await
                .unwrap();
            assert!(!signed);
            assert_eq!(fixture.settlement.phase(), Phase::NoncesPending);
            assert!(fixture.ark.signatures.lock().unwrap().is_empty());
        }

        let signed = fixture
            .settlement
            .on_tree_nonces(&nonces_event(tree.txid()))
            .await
            .unwrap();
        assert!(signed);
        assert_eq!(fixture.settlement.phase(), Phase::Signed);

        let signatures = fixture.ark.signatures.lock().unwrap();
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].0, BATCH_ID);
        assert_eq!(
            signatures[0].2.get(&tree.txid()).map(String::as_str),
            Some("partial-sig")
        );
    }

    #[tokio::test]
    async fn test_handlers_reject_wrong_phase() {
        let mut fixture = Fixture::new(vec![], 1, false);

        let nonces = fixture.settlement.on_tree_nonces(&nonces_event(txid(1))).await;
        assert!(matches!(nonces, Err(ArkError::InvalidStateTransition { .. })));

        let commitment = commitment_psbt(&[], true);
        let finalization = fixture
            .settlement
            .on_batch_finalization(&finalization_event(&commitment), None, None)
            .await;
        assert!(matches!(finalization, Err(ArkError::InvalidStateTransition { .. })));
        assert_eq!(fixture.settlement.phase(), Phase::Idle);
    }

    // Phase 4

    #[tokio::test]
    async fn test_finalization_boarding_and_settlement() {
        let boarding_a = wallet_input(0xb1);
        let boarding_b = wallet_input(0xb2);
        let settled: Vec<_> = [0xc1, 0xc2, 0xc3].into_iter().map(wallet_input).collect();
        let inputs = vec![
            settled[0].clone(),
            boarding_a.clone(),
            settled[1].clone(),
            boarding_b.clone(),
            settled[2].clone(),
        ];

        let mut fixture = Fixture::new(inputs, 1, false);
        let commitment = commitment_psbt(&[&boarding_a, &boarding_b], true);
        let vtxo_tree = drive_to_signed(&mut fixture, &commitment).await;
        let connector_tree = fan_out_tree(0x50, 3);
        let connector_txids: Vec<Txid> = connector_tree
            .leaves()
            .iter()
            .map(|leaf| leaf.unsigned_tx.compute_txid())
            .collect();

        fixture
            .settlement
            .on_batch_finalization(
                &finalization_event(&commitment),
                Some(&vtxo_tree),
                Some(&connector_tree),
            )
            .await
            .unwrap();
        assert_eq!(fixture.settlement.phase(), Phase::Done);

        let request = fixture.request().unwrap();
        assert_eq!(request.proof, "proof-psbt");
        assert_eq!(request.message, "register-message");
        assert_eq!(request.connector_tree.as_ref().map(Vec::len), Some(4));

        // One forfeit per settled VTXO, connectors consumed in leaf order
        assert_eq!(request.forfeits.len(), 3);
        for ((forfeit, vtxo), connector_txid) in
            request.forfeits.iter().zip(&settled).zip(&connector_txids)
        {
            let forfeit = Psbt::from_str(forfeit).unwrap();
            assert_eq!(forfeit.unsigned_tx.input[0].previous_output, vtxo.outpoint);
            assert_eq!(
                forfeit.unsigned_tx.input[1].previous_output,
                OutPoint::new(*connector_txid, 0)
            );
            assert_eq!(signed_input_indices(&forfeit), vec![0]);
            assert_eq!(
                embedded_script(&forfeit.inputs[0]),
                Some(&[0xd4, 0x52, 0x87][..])
            );
        }

        // Boarding inputs signed in place at exactly their two indices
        let signed_commitment = Psbt::from_str(request.commitment_tx.as_deref().unwrap()).unwrap();
        assert_eq!(signed_input_indices(&signed_commitment), vec![1, 2]);
        assert!(embedded_script(&signed_commitment.inputs[0]).is_none());
        assert!(embedded_script(&signed_commitment.inputs[1]).is_some());
        assert!(embedded_script(&signed_commitment.inputs[2]).is_some());

        let (forfeits, commitment_tx) = fixture.completed().unwrap();
        assert_eq!(forfeits, request.forfeits);
        assert_eq!(commitment_tx, request.commitment_tx);
    }

    #[tokio::test]
    async fn test_connectors_exhausted() {
        let boarding_a = wallet_input(0xb1);
        let boarding_b = wallet_input(0xb2);
        let inputs = vec![
            boarding_a.clone(),
            boarding_b.clone(),
            wallet_input(0xc1),
            wallet_input(0xc2),
            wallet_input(0xc3),
        ];

        let mut fixture = Fixture::new(inputs, 1, false);
        let commitment = commitment_psbt(&[&boarding_a, &boarding_b], true);
        drive_to_signed(&mut fixture, &commitment).await;

        let result = fixture
            .settlement
            .on_batch_finalization(
                &finalization_event(&commitment),
                None,
                Some(&fan_out_tree(0x51, 2)),
            )
            .await;

        assert!(matches!(
            result,
            Err(ArkError::ConnectorsExhausted {
                needed: 3,
                available: 2
            })
        ));
        assert!(fixture.request().is_none());
        assert!(fixture.completed().is_none());
        assert_ne!(fixture.settlement.phase(), Phase::Done);
    }

    #[tokio::test]
    async fn test_settlement_only_sends_no_commitment() {
        let mut fixture = Fixture::new(vec![wallet_input(0xc1)], 1, true);
        let commitment = commitment_psbt(&[], true);
        drive_to_signed(&mut fixture, &commitment).await;

        fixture
            .settlement
            .on_batch_finalization(&finalization_event(&commitment), None, Some(&fan_out_tree(0x52, 1)))
            .await
            .unwrap();

        let request = fixture.request().unwrap();
        assert_eq!(request.forfeits.len(), 1);
        assert_eq!(request.commitment_tx, None);
        assert_eq!(fixture.completed().unwrap().1, None);
    }

    #[tokio::test]
    async fn test_cosigned_commitment_preferred() {
        let boarding = wallet_input(0xb1);
        let mut fixture = Fixture::new(vec![boarding.clone()], 1, true);
        let commitment = commitment_psbt(&[&boarding], true);
        drive_to_signed(&mut fixture, &commitment).await;

        fixture
            .settlement
            .on_batch_finalization(&finalization_event(&commitment), None, None)
            .await
            .unwrap();

        let request = fixture.request().unwrap();
        assert!(request.forfeits.is_empty());
        assert!(request.connector_tree.is_none());
        assert!(request.commitment_tx.is_some());
        assert_eq!(
            fixture.completed().unwrap().1.as_deref(),
            Some("cosigned-commitment")
        );
    }

    #[tokio::test]
    async fn test_vtxo_tree_must_spend_shared_output() {
        let mut fixture = Fixture::new(vec![], 1, false);
        let commitment = commitment_psbt(&[], true);
        drive_to_signed(&mut fixture, &commitment).await;

        let result = fixture
            .settlement
            .on_batch_finalization(&finalization_event(&commitment), Some(&fan_out_tree(0x53, 1)), None)
            .await;
        assert!(matches!(result, Err(ArkError::Transaction { .. })));
        assert!(fixture.request().is_none());
    }

    // Event routing

    fn tree_events(tree: &TxTree, batch_index: u32) -> Vec<BatchEvent> {
        tree.to_nodes()
            .into_iter()
            .map(|node| {
                BatchEvent::TreeTx(TreeTxEvent {
                    id: BATCH_ID.to_string(),
                    topic: Vec::new(),
                    batch_index,
                    node,
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_event_stream_to_done() {
        let boarding = wallet_input(0xb1);
        let settled = wallet_input(0xc1);
        let mut fixture = Fixture::new(vec![boarding.clone(), settled], 1, false);
        let commitment = commitment_psbt(&[&boarding], true);
        let vtxo_tree = fan_out_from(OutPoint::new(commitment.unsigned_tx.compute_txid(), 0), 2);
        let connector_tree = fan_out_tree(0x54, 1);

        let mut events = vec![BatchEvent::BatchStarted(started_event(vec![INTENT_HASH]))];
        events.extend(tree_events(&vtxo_tree, VTXO_TREE_INDEX));
        events.push(BatchEvent::TreeSigningStarted(signing_event(
            &commitment,
            vec![signer_cosigner_key()],
        )));
        events.push(BatchEvent::TreeNonces(nonces_event(vtxo_tree.txid())));
        events.extend(tree_events(&connector_tree, CONNECTOR_TREE_INDEX));

        for event in &events {
            let step = fixture.settlement.handle_event(event).await.unwrap();
            assert_eq!(step, Step::Continue);
        }

        let foreign = BatchEvent::TreeNonces(TreeNoncesEvent {
            id: "other-batch".to_string(),
            ..nonces_event(vtxo_tree.txid())
        });
        assert_eq!(
            fixture.settlement.handle_event(&foreign).await.unwrap(),
            Step::Ignored
        );

        let finalization = BatchEvent::BatchFinalization(finalization_event(&commitment));
        assert_eq!(
            fixture.settlement.handle_event(&finalization).await.unwrap(),
            Step::Done
        );
        assert_eq!(fixture.settlement.phase(), Phase::Done);
        assert_eq!(
            fixture.signer.initialized.lock().unwrap().map(|(root, _, _)| root),
            Some(vtxo_tree.txid())
        );

        let request = fixture.request().unwrap();
        assert_eq!(request.forfeits.len(), 1);
        assert_eq!(request.connector_tree.map(|nodes| nodes.len()), Some(2));

        // Round is over
        assert_eq!(
            fixture.settlement.handle_event(&finalization).await.unwrap(),
            Step::Ignored
        );
    }

    #[tokio::test]
    async fn test_signing_event_without_vtxo_tree() {
        let mut fixture = Fixture::new(vec![], 1, false);
        let commitment = commitment_psbt(&[], true);
        fixture
            .settlement
            .handle_event(&BatchEvent::BatchStarted(started_event(vec![INTENT_HASH])))
            .await
            .unwrap();

        let result = fixture
            .settlement
            .handle_event(&BatchEvent::TreeSigningStarted(signing_event(
                &commitment,
                vec![signer_cosigner_key()],
            )))
            .await;
        assert!(matches!(result, Err(ArkError::MissingData { .. })));
    }

    #[tokio::test]
    async fn test_batch_failed_aborts_round() {
        let mut fixture = Fixture::new(vec![], 1, false);
        fixture
            .settlement
            .handle_event(&BatchEvent::BatchStarted(started_event(vec![INTENT_HASH])))
            .await
            .unwrap();

        let result = fixture
            .settlement
            .handle_event(&BatchEvent::BatchFailed(BatchFailedEvent {
                id: BATCH_ID.to_string(),
                reason: "not enough participants".to_string(),
            }))
            .await;

        match result {
            Err(ArkError::RoundFailed { batch_id, reason }) => {
                assert_eq!(batch_id, BATCH_ID);
                assert_eq!(reason, "not enough participants");
            }
            other => panic!("expected round failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_skipped_wallet_ignores_rest_of_round() {
        let mut fixture = Fixture::new(vec![], 1, false);
        let step = fixture
            .settlement
            .handle_event(&BatchEvent::BatchStarted(started_event(vec![])))
            .await
            .unwrap();
        assert_eq!(step, Step::Skipped);

        let nonces = BatchEvent::TreeNonces(nonces_event(txid(1)));
        assert_eq!(
            fixture.settlement.handle_event(&nonces).await.unwrap(),
            Step::Ignored
        );
    }
}
