//! NTP-style round-trip responder. Stateless: the client supplies its send
//! timestamp, the server stamps receipt and reply, and the client derives
//! offset and round-trip from the four marks.

use gavel_rs::clock::unix_ms;
use gavel_rs::events::ServerEvent;

pub fn respond(client_timestamp_t0_in_ms: i64) -> ServerEvent {
    ServerEvent::TimeSyncResponse {
        client_timestamp_t0_in_ms,
        server_timestamp_t1_in_ms: unix_ms(),
        server_timestamp_t2_in_ms: unix_ms(),
    }
}
