//! Round coordinator integration tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vigil_consensus::{
    ActionEvent, Agent, AgentError, ConsensusError, CoordinatorConfig, NotifyAction,
    PrePrepareMsg, RequestMsg, RoundCoordinator, Transport, TransportContext, TransportFactory,
    VoteResult,
};
use vigil_core::serialize::{from_hex_blob, to_bytes, to_hex_blob};
use vigil_core::{
    genesis_header, Block, BlockHeader, CommitteeInfo, CommitteeMember, CommitteeNode, KeyPair,
};

/// Agent whose head stays put until told otherwise
struct ChainAgent {
    head: Mutex<BlockHeader>,
    proposer: KeyPair,
    finalized: Mutex<Vec<Block>>,
    rebroadcasts: AtomicUsize,
    fail_finalize: AtomicBool,
}

impl ChainAgent {
    fn at_height(height: u64) -> Arc<Self> {
        let mut head = genesis_header(1, 0);
        head.height = height;
        Arc::new(ChainAgent {
            head: Mutex::new(head),
            proposer: KeyPair::generate(),
            finalized: Mutex::new(Vec::new()),
            rebroadcasts: AtomicUsize::new(0),
            fail_finalize: AtomicBool::new(false),
        })
    }

    fn candidate(&self) -> Block {
        let head = self.head.lock().unwrap();
        Block::child_of(&head, self.proposer.public, 1_700_000_000, vec![b"payload".to_vec()])
            .unwrap()
    }
}

impl Agent for ChainAgent {
    fn fetch_candidate_block(&self) -> Result<Block, AgentError> {
        Ok(self.candidate())
    }

    fn verify_block(&self, block: &Block) -> Result<(), AgentError> {
        if block.verify_payload_root() {
            Ok(())
        } else {
            Err(AgentError::Rejected("payload root mismatch".into()))
        }
    }

    fn finalize_and_broadcast(&self, block: &Block) -> Result<(), AgentError> {
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(AgentError::Unavailable("chain busy".into()));
        }
        self.finalized.lock().unwrap().push(block.clone());
        Ok(())
    }

    fn rebroadcast(&self, _block: &Block) -> Result<(), AgentError> {
        self.rebroadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTransport {
    started: AtomicBool,
    stopped: AtomicBool,
    requests: Mutex<Vec<RequestMsg>>,
    tables: Mutex<Vec<BTreeMap<String, String>>>,
}

impl Transport for RecordingTransport {
    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn put_request(&self, request: RequestMsg) {
        self.requests.lock().unwrap().push(request);
    }

    fn update_nodes(&self, table: &BTreeMap<String, String>) {
        self.tables.lock().unwrap().push(table.clone());
    }
}

#[derive(Default)]
struct RecordingFactory {
    built: Mutex<Vec<Arc<RecordingTransport>>>,
    actions: Mutex<Vec<tokio::sync::mpsc::Sender<ActionEvent>>>,
}

impl RecordingFactory {
    fn transport(&self, index: usize) -> Arc<RecordingTransport> {
        Arc::clone(&self.built.lock().unwrap()[index])
    }
}

impl TransportFactory for RecordingFactory {
    fn create(&self, ctx: TransportContext) -> Arc<dyn Transport> {
        let transport = Arc::new(RecordingTransport::default());
        self.built.lock().unwrap().push(Arc::clone(&transport));
        self.actions.lock().unwrap().push(ctx.actions);
        transport
    }
}

struct Fixture {
    coord: RoundCoordinator,
    agent: Arc<ChainAgent>,
    factory: Arc<RecordingFactory>,
    local: KeyPair,
}

/// A coordinator whose local node leads committee `cid`
fn leader_fixture(cid: u64, head: u64) -> Fixture {
    leader_fixture_with(cid, head, CoordinatorConfig::default())
}

fn leader_fixture_with(cid: u64, head: u64, config: CoordinatorConfig) -> Fixture {
    let local = KeyPair::generate();
    let agent = ChainAgent::at_height(head);
    let factory = Arc::new(RecordingFactory::default());
    let mut coord = RoundCoordinator::new(
        config,
        local.clone(),
        agent.clone(),
        factory.clone(),
    );

    let peer = KeyPair::generate();
    coord
        .put_committee(CommitteeInfo {
            id: cid,
            members: vec![
                CommitteeMember {
                    coinbase: local.public,
                    public_key: local.public,
                },
                CommitteeMember {
                    coinbase: peer.public,
                    public_key: peer.public,
                },
            ],
        })
        .unwrap();

    Fixture {
        coord,
        agent,
        factory,
        local,
    }
}

fn node(public_key: vigil_core::PublicKey, port: u16) -> CommitteeNode {
    CommitteeNode {
        coinbase: public_key,
        public_key,
        ip: "127.0.0.1".to_string(),
        port,
    }
}

fn pre_prepare(request: RequestMsg) -> PrePrepareMsg {
    PrePrepareMsg {
        view_id: 0,
        sequence_id: request.height,
        digest: String::new(),
        request,
    }
}

fn request_at(height: i64) -> RequestMsg {
    RequestMsg {
        client_id: "peer".to_string(),
        timestamp: 0,
        operation: String::new(),
        height,
    }
}

#[test]
fn test_second_request_at_same_height_is_duplicate() {
    let fx = leader_fixture(7, 10);

    let first = fx.coord.get_request(7).unwrap();
    assert_eq!(first.height, 11);
    assert_eq!(first.client_id, fx.local.public.to_hex());

    let err = fx.coord.get_request(7).unwrap_err();
    assert!(matches!(err, ConsensusError::DuplicateHeight(11)));

    let round = fx.coord.committee_round(7).unwrap();
    assert_eq!(round.store().len(), 1);
    let stored = round.store().get(11).unwrap();
    assert_eq!(to_hex_blob(&stored).unwrap(), first.operation);
}

#[test]
fn test_request_heights_must_be_contiguous() {
    let fx = leader_fixture(7, 10);
    fx.coord.get_request(7).unwrap();

    // Head jumps ahead while block 11 is still pending
    fx.agent.head.lock().unwrap().height = 12;
    let err = fx.coord.get_request(7).unwrap_err();
    assert!(matches!(
        err,
        ConsensusError::HeightDiscontinuity {
            expected: 12,
            got: 13
        }
    ));

    fx.agent.head.lock().unwrap().height = 11;
    assert_eq!(fx.coord.get_request(7).unwrap().height, 12);
}

#[test]
fn test_undecodable_pre_prepare_leaves_store_untouched() {
    let fx = leader_fixture(7, 10);
    let mut request = request_at(11);
    request.operation = "zz-not-hex".to_string();

    assert!(!fx.coord.insert_block(7, &pre_prepare(request.clone())));

    request.operation = "00ff".to_string();
    assert!(!fx.coord.insert_block(7, &pre_prepare(request.clone())));

    assert!(matches!(
        fx.coord.check_msg(7, &request),
        Err(ConsensusError::BlockNotFound(11))
    ));
    assert!(fx.coord.committee_round(7).unwrap().store().is_empty());
}

#[test]
fn test_reply_without_block_is_false() {
    let fx = leader_fixture(7, 10);
    fx.coord.get_request(7).unwrap();

    assert!(!fx.coord.reply_result(7, &request_at(30), VoteResult::Agree));
    assert_eq!(fx.coord.committee_round(7).unwrap().store().len(), 1);
    assert!(fx.agent.finalized.lock().unwrap().is_empty());
}

#[test]
fn test_replica_path_preserves_block_bytes() {
    let leader = leader_fixture(7, 10);
    let request = leader.coord.get_request(7).unwrap();

    // A follower of the same committee
    let replica_agent = ChainAgent::at_height(10);
    let mut replica = RoundCoordinator::new(
        CoordinatorConfig::default(),
        KeyPair::generate(),
        replica_agent.clone(),
        Arc::new(RecordingFactory::default()),
    );
    replica
        .put_committee(CommitteeInfo {
            id: 7,
            members: vec![CommitteeMember {
                coinbase: leader.local.public,
                public_key: leader.local.public,
            }],
        })
        .unwrap();
    assert!(!replica.is_leader(7));

    assert!(replica.insert_block(7, &pre_prepare(request.clone())));
    replica.check_msg(7, &request).unwrap();
    assert!(replica.sign_msg(7, request.height, VoteResult::Agree).is_some());
    assert!(replica.reply_result(7, &request, VoteResult::Agree));

    let finalized = replica_agent.finalized.lock().unwrap();
    let sent: Block = from_hex_blob(&request.operation).unwrap();
    assert_eq!(to_bytes(&finalized[0]).unwrap(), to_bytes(&sent).unwrap());
    assert!(replica.committee_round(7).unwrap().store().is_empty());
}

#[test]
fn test_replica_insert_overwrites() {
    let fx = leader_fixture(7, 10);
    let round = fx.coord.committee_round(7).unwrap();
    let mut request = request_at(11);

    let first = fx.agent.candidate();
    request.operation = to_hex_blob(&first).unwrap();
    assert!(fx.coord.insert_block(7, &pre_prepare(request.clone())));

    let mut second = first.clone();
    second.header.timestamp += 1;
    request.operation = to_hex_blob(&second).unwrap();
    assert!(fx.coord.insert_block(7, &pre_prepare(request)));

    assert_eq!(round.store().len(), 1);
    assert_eq!(round.store().get(11).unwrap(), second);
}

#[test]
fn test_reply_removes_entry_even_when_finalize_fails() {
    let fx = leader_fixture(7, 10);
    let request = fx.coord.get_request(7).unwrap();
    fx.agent.fail_finalize.store(true, Ordering::SeqCst);

    assert!(!fx.coord.reply_result(7, &request, VoteResult::Agree));
    assert!(fx.coord.committee_round(7).unwrap().store().is_empty());

    // The height is free again
    fx.agent.fail_finalize.store(false, Ordering::SeqCst);
    let again = fx.coord.get_request(7).unwrap();
    assert_eq!(again.height, 11);
}

#[test]
fn test_check_msg_surfaces_agent_rejection() {
    let fx = leader_fixture(7, 10);
    let mut block = fx.agent.candidate();
    block.payload.push(b"smuggled".to_vec());
    let mut request = request_at(11);
    request.operation = to_hex_blob(&block).unwrap();
    assert!(fx.coord.insert_block(7, &pre_prepare(request.clone())));

    let err = fx.coord.check_msg(7, &request).unwrap_err();
    assert!(matches!(err, ConsensusError::Agent(AgentError::Rejected(_))));
    assert_eq!(err.to_string(), "Block rejected: payload root mismatch");
}

#[test]
fn test_put_nodes_builds_then_updates_transport() {
    let mut fx = leader_fixture(7, 10);
    let peer = KeyPair::generate();

    fx.coord
        .put_nodes(7, vec![node(fx.local.public, 9000)])
        .unwrap();
    assert_eq!(fx.factory.built.lock().unwrap().len(), 1);

    fx.coord
        .put_nodes(7, vec![node(fx.local.public, 9001), node(peer.public, 9002)])
        .unwrap();
    assert_eq!(fx.factory.built.lock().unwrap().len(), 1);

    let transport = fx.factory.transport(0);
    let tables = transport.tables.lock().unwrap();
    let table = tables.last().unwrap();
    assert_eq!(table[&fx.local.public.to_hex()], "127.0.0.1:9001");
    assert_eq!(table[&peer.public.to_hex()], "127.0.0.1:9002");
    // Two committee members plus the newcomer
    assert_eq!(fx.coord.nodes(7).unwrap().len(), 3);
    // The elected peer never announced an endpoint
    assert_eq!(table.len(), 2);
}

#[tokio::test]
async fn test_start_fetches_and_hands_request_to_transport() {
    let mut fx = leader_fixture(7, 10);
    fx.coord
        .put_nodes(7, vec![node(fx.local.public, 9000)])
        .unwrap();

    fx.coord.notify(7, NotifyAction::Start).unwrap();
    assert!(matches!(
        fx.coord.notify(7, NotifyAction::Start),
        Err(ConsensusError::AlreadyStarted(7))
    ));

    let transport = fx.factory.transport(0);
    assert!(transport.started.load(Ordering::SeqCst));

    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.requests.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(transport.requests.lock().unwrap()[0].height, 11);
    assert_eq!(fx.coord.current_height(7), Some(11));

    // Engine asks for a rebroadcast through the action queue
    let actions = fx.factory.actions.lock().unwrap()[0].clone();
    actions
        .send(ActionEvent::Broadcast { height: 11 })
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while fx.agent.rebroadcasts.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), fx.coord.finish())
        .await
        .unwrap();
    assert!(transport.stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_stop_clears_committee() {
    let mut fx = leader_fixture(7, 10);
    fx.coord
        .put_nodes(7, vec![node(fx.local.public, 9000)])
        .unwrap();
    fx.coord.notify(7, NotifyAction::Start).unwrap();

    fx.coord.notify(7, NotifyAction::Switch).unwrap();
    assert_eq!(fx.coord.committee_ids(), vec![7]);

    fx.coord.notify(7, NotifyAction::Stop).unwrap();
    assert!(fx.coord.committee_ids().is_empty());
    assert!(fx.factory.transport(0).stopped.load(Ordering::SeqCst));
    assert!(matches!(
        fx.coord.get_request(7),
        Err(ConsensusError::UnknownCommittee(7))
    ));
}

#[tokio::test]
async fn test_stop_with_full_action_queue_ends_loop() {
    let mut fx = leader_fixture_with(7, 10, CoordinatorConfig { action_capacity: 1 });
    fx.coord
        .put_nodes(7, vec![node(fx.local.public, 9000)])
        .unwrap();

    // The initial Fetch fills the queue before the loop ever runs
    fx.coord.notify(7, NotifyAction::Start).unwrap();
    fx.coord.notify(7, NotifyAction::Stop).unwrap();
    assert!(fx.coord.committee_ids().is_empty());

    tokio::time::timeout(Duration::from_secs(5), fx.coord.finish())
        .await
        .unwrap();

    let transport = fx.factory.transport(0);
    assert!(transport.requests.lock().unwrap().is_empty());
    assert!(fx.agent.finalized.lock().unwrap().is_empty());

    // The loop is gone, so the engine's sender has nobody to deliver to
    let actions = fx.factory.actions.lock().unwrap()[0].clone();
    assert!(actions.try_send(ActionEvent::Fetch).is_err());
    assert!(actions.is_closed());
}

#[tokio::test]
async fn test_clear_zero_removes_retired_committees() {
    let mut fx = leader_fixture(7, 10);
    for cid in [8, 9] {
        fx.coord
            .put_committee(CommitteeInfo {
                id: cid,
                members: vec![CommitteeMember {
                    coinbase: fx.local.public,
                    public_key: fx.local.public,
                }],
            })
            .unwrap();
        fx.coord
            .put_nodes(cid, vec![node(fx.local.public, 9000)])
            .unwrap();
    }
    fx.coord.notify(8, NotifyAction::Start).unwrap();

    fx.coord.retire(8).unwrap();
    fx.coord.retire(9).unwrap();
    assert!(matches!(
        fx.coord.retire(42),
        Err(ConsensusError::UnknownCommittee(42))
    ));
    // Retiring committees keep serving until the sweep
    assert!(fx.coord.is_retiring(8));
    assert_eq!(fx.coord.committee_ids(), vec![7, 8, 9]);

    fx.coord.clear(0);
    assert_eq!(fx.coord.committee_ids(), vec![7]);
    assert!(!fx.coord.is_retiring(7));
    assert!(fx.factory.transport(0).stopped.load(Ordering::SeqCst));
    assert!(fx.factory.transport(1).stopped.load(Ordering::SeqCst));

    tokio::time::timeout(Duration::from_secs(5), fx.coord.finish())
        .await
        .unwrap();
}

#[test]
fn test_clear_zero_removes_only_retiring() {
    let mut fx = leader_fixture(7, 10);
    fx.coord
        .put_committee(CommitteeInfo {
            id: 8,
            members: vec![CommitteeMember {
                coinbase: fx.local.public,
                public_key: fx.local.public,
            }],
        })
        .unwrap();

    // Nothing is retiring yet
    fx.coord.clear(0);
    assert_eq!(fx.coord.committee_ids(), vec![7, 8]);

    // Stop of an unknown id is harmless
    fx.coord.notify(99, NotifyAction::Stop).unwrap();
    assert_eq!(fx.coord.committee_ids(), vec![7, 8]);
}
