//! Stream operations: XADD, XRANGE, XREAD.

use crate::error::CommandError;
use crate::protocol::Frame;
use crate::server::Server;
use crate::storage::StreamEntry;
use std::time::Duration;

/// `XADD stream id field value [field value ...]`
pub fn xadd(server: &Server, args: &[String]) -> Frame {
    if args.len() < 2 || args.len() % 2 != 0 {
        return Frame::error(CommandError::wrong_arity("xadd").to_string());
    }

    let fields: Vec<(String, String)> = args[2..]
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();

    match server.streams().append(&args[0], &args[1], fields) {
        Ok(id) => Frame::bulk(id.to_string()),
        Err(e) => Frame::error(e.to_string()),
    }
}

/// `XRANGE stream start end`: a closed range over `(ms, seq)` ids. `-`
/// and `+` denote the stream's extremes.
pub fn xrange(server: &Server, args: &[String]) -> Frame {
    if args.len() < 3 {
        return Frame::error(CommandError::wrong_arity("xrange").to_string());
    }

    match server.streams().range(&args[0], &args[1], &args[2]) {
        Ok(entries) => Frame::Array(entries.iter().map(encode_entry).collect()),
        Err(e) => Frame::error(e.to_string()),
    }
}

/// `XREAD [BLOCK ms] streams key... id...`
///
/// With `BLOCK 0` the caller parks on the stream wakeup until any writer
/// appends; a positive block time sleeps for that long before reading.
pub async fn xread(server: &Server, args: &[String]) -> Frame {
    if args.len() < 3 {
        return Frame::error(CommandError::wrong_arity("xread").to_string());
    }

    let mut rest = args;
    if rest[0].eq_ignore_ascii_case("BLOCK") {
        let Ok(ms) = rest[1].parse::<i64>() else {
            return Frame::error("ERR block time is not an integer or out of range");
        };
        rest = &rest[2..];
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        } else if ms == 0 {
            server.streams().wait_for_append().await;
        }
    }

    if rest.is_empty() || !rest[0].eq_ignore_ascii_case("streams") {
        return Frame::error("ERR can only read streams at the moment");
    }
    let rest = &rest[1..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Frame::error(CommandError::wrong_arity("xread").to_string());
    }

    let count = rest.len() / 2;
    let mut blocks = Vec::with_capacity(count);
    for i in 0..count {
        let key = &rest[i];
        let start = &rest[i + count];
        match server.streams().read_from(key, start) {
            Ok(Some(entries)) => blocks.push(Frame::Array(vec![
                Frame::bulk(key.clone()),
                Frame::Array(entries.iter().map(encode_read_entry).collect()),
            ])),
            Ok(None) => return Frame::Null,
            Err(e) => return Frame::error(e.to_string()),
        }
    }

    Frame::Array(blocks)
}

/// `[id, [k, v, k, v, ...]]` with a simple-string id, as XRANGE replies.
fn encode_entry(entry: &StreamEntry) -> Frame {
    Frame::Array(vec![
        Frame::simple(entry.id.to_string()),
        encode_fields(entry),
    ])
}

/// `[id, [k, v, k, v, ...]]` with a bulk id, as XREAD replies.
fn encode_read_entry(entry: &StreamEntry) -> Frame {
    Frame::Array(vec![
        Frame::bulk(entry.id.to_string()),
        encode_fields(entry),
    ])
}

fn encode_fields(entry: &StreamEntry) -> Frame {
    Frame::Array(
        entry
            .fields
            .iter()
            .flat_map(|(k, v)| [Frame::simple(k.clone()), Frame::simple(v.clone())])
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Config;
    use std::sync::Arc;

    fn server() -> Arc<Server> {
        Arc::new(Server::new(Config::default()))
    }

    fn s(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn xadd_returns_the_allocated_id() {
        let srv = server();
        assert_eq!(
            xadd(&srv, &s(&["st", "0-1", "k", "v"])),
            Frame::bulk("0-1")
        );
        assert_eq!(
            xadd(&srv, &s(&["st", "0-1", "k", "v"])),
            Frame::error(
                "ERR The ID specified in XADD is equal or smaller than the target stream top item"
            )
        );
        assert_eq!(
            xadd(&srv, &s(&["st", "0-0", "k", "v"])),
            Frame::error("ERR The ID specified in XADD must be greater than 0-0")
        );
    }

    #[test]
    fn xadd_arity() {
        let srv = server();
        assert_eq!(
            xadd(&srv, &s(&["st"])),
            Frame::error("ERR wrong number of arguments for 'xadd' command")
        );
        // Dangling field name without a value.
        assert_eq!(
            xadd(&srv, &s(&["st", "1-1", "k"])),
            Frame::error("ERR wrong number of arguments for 'xadd' command")
        );
    }

    #[test]
    fn xrange_encodes_entries() {
        let srv = server();
        xadd(&srv, &s(&["st", "1-1", "a", "1"]));
        xadd(&srv, &s(&["st", "1-2", "b", "2", "c", "3"]));

        let reply = xrange(&srv, &s(&["st", "-", "+"]));
        let entries = reply.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            Frame::Array(vec![
                Frame::simple("1-1"),
                Frame::Array(vec![Frame::simple("a"), Frame::simple("1")]),
            ])
        );
        assert_eq!(
            entries[1].as_array().unwrap()[1].as_array().unwrap().len(),
            4
        );
    }

    #[test]
    fn xrange_unknown_stream() {
        let srv = server();
        assert_eq!(
            xrange(&srv, &s(&["nope", "-", "+"])),
            Frame::error("ERR stream not found")
        );
    }

    #[tokio::test]
    async fn xread_returns_successors() {
        let srv = server();
        xadd(&srv, &s(&["st", "1-1", "a", "1"]));
        xadd(&srv, &s(&["st", "2-1", "b", "2"]));

        let reply = xread(&srv, &s(&["streams", "st", "1-1"])).await;
        let blocks = reply.as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        let block = blocks[0].as_array().unwrap();
        assert_eq!(block[0], Frame::bulk("st"));
        let entries = block[1].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].as_array().unwrap()[0], Frame::bulk("2-1"));
    }

    #[tokio::test]
    async fn xread_without_successor_is_null() {
        let srv = server();
        xadd(&srv, &s(&["st", "1-1", "a", "1"]));
        let reply = xread(&srv, &s(&["streams", "st", "1-1"])).await;
        assert!(reply.is_null());
    }

    #[tokio::test]
    async fn xread_block_zero_wakes_on_append() {
        let srv = server();
        xadd(&srv, &s(&["st", "1-1", "a", "1"]));

        let reader = {
            let srv = srv.clone();
            tokio::spawn(async move {
                xread(&srv, &s(&["BLOCK", "0", "streams", "st", "1-1"])).await
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        xadd(&srv, &s(&["st", "2-0", "b", "2"]));

        let reply = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("blocked reader never woke")
            .unwrap();
        let blocks = reply.as_array().unwrap();
        let entries = blocks[0].as_array().unwrap()[1].as_array().unwrap();
        assert_eq!(entries[0].as_array().unwrap()[0], Frame::bulk("2-0"));
    }

    #[tokio::test]
    async fn xread_block_positive_sleeps_then_reads() {
        let srv = server();
        xadd(&srv, &s(&["st", "1-1", "a", "1"]));
        xadd(&srv, &s(&["st", "2-0", "b", "2"]));

        let reply = xread(&srv, &s(&["BLOCK", "10", "streams", "st", "1-1"])).await;
        assert!(!reply.is_null());
    }
}
