//! Exercises the raw frame transport over an in-memory duplex pipe, independent of any RMI
//! dispatch logic.

use rmifs_core::InmemoryTransport;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Ping {
    n: u32,
}

#[tokio::test]
async fn inmemory_transport_round_trips_a_value_without_a_real_socket() {
    let (mut client, mut server) = InmemoryTransport::pair(4096);

    client.send(&Ping { n: 42 }).await.unwrap();
    let received: Ping = server.receive().await.unwrap().unwrap();
    assert_eq!(received, Ping { n: 42 });

    server.send(&Ping { n: 7 }).await.unwrap();
    let reply: Ping = client.receive().await.unwrap().unwrap();
    assert_eq!(reply, Ping { n: 7 });
}

#[tokio::test]
async fn inmemory_transport_reports_peer_close_as_none() {
    let (client, mut server) = InmemoryTransport::pair(4096);
    drop(client);
    let received: Option<Ping> = server.receive().await.unwrap();
    assert_eq!(received, None);
}
