//! Cluster integration tests.
//!
//! Whole nodes wired together over the in-process transport: leader
//! bootstrap, joining, replication, majority commit, leader failover, and
//! partition recovery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use raftreg::command::{Command, CommandOperation};
use raftreg::config::NodeConfig;
use raftreg::node::RaftNode;
use raftreg::rpc::memory::MemoryCluster;
use raftreg::state::Role;
use raftreg::types::NodeAddress;

// Tight timings so failover tests finish quickly. Heartbeat stays well
// below the presence window, as in any healthy deployment.
const HEARTBEAT: Duration = Duration::from_millis(20);
const PRESENCE_MIN: Duration = Duration::from_millis(80);
const PRESENCE_MAX: Duration = Duration::from_millis(160);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn test_config(name: &str, port: u16, role: Role) -> NodeConfig {
    let mut config = NodeConfig::new(name, NodeAddress::new("localhost", port), role);
    config.heartbeat_interval = HEARTBEAT;
    config.presence_min = PRESENCE_MIN;
    config.presence_max = PRESENCE_MAX;
    config.replication_timeout = Duration::from_millis(200);
    config.election_round_timeout = Duration::from_secs(1);
    config
}

async fn start_leader(cluster: &Arc<MemoryCluster>, name: &str, port: u16) -> Arc<RaftNode> {
    let config = test_config(name, port, Role::Leader);
    let address = config.address.clone();
    let node = RaftNode::new(config, cluster.client_for(address)).unwrap();
    cluster.add_node(Arc::clone(&node));
    node.start().await.unwrap();
    node
}

async fn join_follower(
    cluster: &Arc<MemoryCluster>,
    name: &str,
    port: u16,
    seed_port: u16,
) -> Arc<RaftNode> {
    let config = test_config(name, port, Role::Follower)
        .with_cluster_address(NodeAddress::new("localhost", seed_port));
    let address = config.address.clone();
    let node = RaftNode::new(config, cluster.client_for(address)).unwrap();
    cluster.add_node(Arc::clone(&node));
    node.start().await.unwrap();
    node
}

/// Leader plus `followers` joiners, all registered through the leader.
async fn three_node_cluster() -> (Arc<MemoryCluster>, Arc<RaftNode>, Arc<RaftNode>, Arc<RaftNode>) {
    init_tracing();
    let cluster = MemoryCluster::new();
    let leader = start_leader(&cluster, "leader1", 5001).await;
    let follower1 = join_follower(&cluster, "follower1", 5002, 5001).await;
    let follower2 = join_follower(&cluster, "follower2", 5003, 5001).await;
    (cluster, leader, follower1, follower2)
}

async fn wait_for(what: &str, deadline: Duration, predicate: impl Fn() -> bool) {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn assign(var: &str, literal: i64) -> Command {
    Command::new(var, CommandOperation::Assign, literal)
}

#[tokio::test]
async fn commands_replicate_to_all_members() {
    let (_cluster, leader, follower1, follower2) = three_node_cluster().await;

    let reply = leader.handle_apply_command(assign("A", 1)).await.unwrap();
    assert_eq!(reply.message, "(A=1) applied");
    let reply = leader
        .handle_apply_command(Command::new("A", CommandOperation::Add, 5))
        .await
        .unwrap();
    assert_eq!(reply.state.value, 6);

    wait_for("followers to converge", Duration::from_secs(2), || {
        follower1.machine_state().value == 6 && follower2.machine_state().value == 6
    })
    .await;

    assert_eq!(leader.log_info(), "(A=1), (A+5)");
    assert_eq!(follower1.log_info(), "(A=1), (A+5)");
    assert_eq!(follower2.log_info(), "(A=1), (A+5)");
    assert_eq!(leader.node_status(), "commitIndex=1, term=0, lastApplied=1");
    assert_eq!(leader.cluster_progress(), "(follower1, 2),(follower2, 2)");
}

#[tokio::test]
async fn followers_forward_commands_to_the_leader() {
    let (_cluster, leader, follower1, _follower2) = three_node_cluster().await;

    let reply = follower1.handle_apply_command(assign("B", 9)).await.unwrap();
    assert_eq!(reply.message, "(B=9) applied");
    assert_eq!(leader.machine_state().value, 9);

    wait_for("forwarded command to replicate", Duration::from_secs(2), || {
        follower1.machine_state().value == 9
    })
    .await;
}

#[tokio::test]
async fn registration_propagates_to_every_member() {
    init_tracing();
    let cluster = MemoryCluster::new();
    let leader = start_leader(&cluster, "leader1", 5001).await;
    let follower1 = join_follower(&cluster, "follower1", 5002, 5001).await;
    // The second joiner finds the leader through a follower seed.
    let follower2 = join_follower(&cluster, "follower2", 5003, 5002).await;

    assert_eq!(
        leader.cluster_members(),
        "(follower1=localhost:5002),(follower2=localhost:5003)"
    );
    // The first follower learned of the second through the rebroadcast.
    assert_eq!(
        follower1.cluster_members(),
        "(follower2=localhost:5003),(leader1=localhost:5001)"
    );
    // The second got the full roster in its registration reply.
    assert_eq!(
        follower2.cluster_members(),
        "(follower1=localhost:5002),(leader1=localhost:5001)"
    );
    assert_eq!(follower2.handle_get_leader().unwrap().name, "leader1");
}

#[tokio::test]
async fn majority_commits_despite_one_lost_follower() {
    let (_cluster, leader, follower1, follower2) = three_node_cluster().await;

    assert_eq!(follower2.disconnect(), "Node disconnected.");

    // Two of three members still reachable: the command commits.
    let reply = leader.handle_apply_command(assign("A", 3)).await.unwrap();
    assert_eq!(reply.message, "(A=3) applied");
    assert_eq!(leader.commit_index(), 0);

    wait_for("reachable follower to converge", Duration::from_secs(2), || {
        follower1.machine_state().value == 3
    })
    .await;
    assert_eq!(follower2.machine_state().value, 0);

    // The lost follower catches up once it returns.
    follower2.reconnect();
    wait_for("reconnected follower to catch up", Duration::from_secs(2), || {
        follower2.machine_state().value == 3
    })
    .await;
    assert_eq!(follower2.log_info(), "(A=3)");
}

#[tokio::test]
async fn followers_elect_a_new_leader_when_the_leader_vanishes() {
    let (_cluster, leader, follower1, follower2) = three_node_cluster().await;
    leader.handle_apply_command(assign("A", 1)).await.unwrap();
    wait_for("initial convergence", Duration::from_secs(2), || {
        follower1.machine_state().value == 1 && follower2.machine_state().value == 1
    })
    .await;

    leader.disconnect();

    wait_for("a follower to take over", Duration::from_secs(5), || {
        follower1.role().is_leader() || follower2.role().is_leader()
    })
    .await;

    let new_leader = if follower1.role().is_leader() {
        Arc::clone(&follower1)
    } else {
        Arc::clone(&follower2)
    };
    assert!(new_leader.current_term() > 0);

    // The new leader serves commands committed by the remaining majority.
    let reply = new_leader
        .handle_apply_command(Command::new("A", CommandOperation::Add, 5))
        .await
        .unwrap();
    assert_eq!(reply.message, "(A+5) applied");
    assert_eq!(new_leader.machine_state().value, 6);
}

#[tokio::test]
async fn stale_leader_steps_down_and_discards_uncommitted_entries() {
    let (_cluster, leader, follower1, follower2) = three_node_cluster().await;
    leader.handle_apply_command(assign("A", 1)).await.unwrap();
    wait_for("initial convergence", Duration::from_secs(2), || {
        follower1.machine_state().value == 1 && follower2.machine_state().value == 1
    })
    .await;

    leader.disconnect();

    // The stale leader accepts a command it can never commit.
    let reply = leader.handle_apply_command(assign("B", 9)).await.unwrap();
    assert_eq!(reply.message, "(B=9) accepted");
    assert_eq!(leader.log_info(), "(A=1), (B=9)");
    assert_eq!(leader.commit_index(), 0);

    wait_for("a follower to take over", Duration::from_secs(5), || {
        follower1.role().is_leader() || follower2.role().is_leader()
    })
    .await;
    let new_leader = if follower1.role().is_leader() {
        Arc::clone(&follower1)
    } else {
        Arc::clone(&follower2)
    };
    new_leader
        .handle_apply_command(Command::new("A", CommandOperation::Add, 2))
        .await
        .unwrap();

    // On return, the old leader defers to the higher term and adopts the
    // authoritative log, dropping its never-committed entry.
    leader.reconnect();
    wait_for("stale leader to converge", Duration::from_secs(5), || {
        leader.role().is_follower() && leader.machine_state().value == 3
    })
    .await;
    assert_eq!(leader.log_info(), "(A=1), (A+2)");
    assert_eq!(leader.current_term(), new_leader.current_term());
    assert_eq!(
        leader.handle_get_leader().unwrap().name,
        new_leader.info().name
    );
}

#[tokio::test]
async fn disconnected_follower_does_not_disrupt_a_healthy_cluster() {
    let (_cluster, leader, follower1, _follower2) = three_node_cluster().await;

    follower1.disconnect();
    // Long enough for several presence windows to lapse.
    tokio::time::sleep(Duration::from_millis(500)).await;

    // The partitioned node must not have campaigned its way to leadership.
    assert!(!follower1.role().is_leader());

    follower1.reconnect();
    leader.handle_apply_command(assign("A", 7)).await.unwrap();
    wait_for("rejoined follower to converge", Duration::from_secs(2), || {
        follower1.machine_state().value == 7 && follower1.role().is_follower()
    })
    .await;
    // The healthy leader was never displaced.
    assert!(leader.role().is_leader());
}

#[tokio::test]
async fn arithmetic_on_unassigned_variables_surfaces_as_state_errors() {
    let (_cluster, leader, follower1, _follower2) = three_node_cluster().await;

    let reply = leader
        .handle_apply_command(Command::new("Z", CommandOperation::Subtract, 1))
        .await
        .unwrap();
    assert_eq!(
        reply.state.errors,
        vec!["Tried to do arithmetic operation Subtract on unassigned variable Z.".to_string()]
    );

    // The error is part of the replicated state, not a local artifact.
    wait_for("error to replicate", Duration::from_secs(2), || {
        follower1.machine_state().errors.len() == 1
    })
    .await;
}
