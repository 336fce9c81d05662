//! String key/value operations: SET, GET, INCR, KEYS, TYPE.

use crate::error::CommandError;
use crate::protocol::Frame;
use crate::server::Server;

/// `SET key value [PX milliseconds]`
///
/// Marks the server as needing acknowledgements so a following WAIT knows a
/// write is outstanding.
pub async fn set(server: &Server, args: &[String]) -> Frame {
    if !(args.len() == 2 || args.len() == 4) {
        return Frame::error(CommandError::wrong_arity("set").to_string());
    }
    server.set_need_acks().await;

    let mut ttl_ms = None;
    if args.len() == 4 {
        if !args[2].eq_ignore_ascii_case("px") {
            return Frame::error(CommandError::SyntaxError.to_string());
        }
        match args[3].parse::<i64>() {
            Ok(ms) => ttl_ms = Some(ms),
            Err(_) => return Frame::error(CommandError::NotInteger.to_string()),
        }
    }

    server.kv().set(&args[0], &args[1], ttl_ms);
    Frame::ok()
}

/// `GET key` replies null when the key is absent or expired; an expired
/// key is removed by the read.
pub fn get(server: &Server, args: &[String]) -> Frame {
    if args.len() != 1 {
        return Frame::error(CommandError::wrong_arity("get").to_string());
    }
    match server.kv().get(&args[0]) {
        Some(value) => Frame::simple(value),
        None => Frame::Null,
    }
}

/// `INCR key` treats the value as a signed decimal counter.
pub fn incr(server: &Server, args: &[String]) -> Frame {
    if args.len() != 1 {
        return Frame::error(CommandError::wrong_arity("incr").to_string());
    }
    match server.kv().incr(&args[0]) {
        Ok(n) => Frame::Integer(n),
        Err(e) => Frame::error(e.to_string()),
    }
}

/// `KEYS pattern`: `*` matches everything; any other pattern is a
/// substring containment test.
pub fn keys(server: &Server, args: &[String]) -> Frame {
    if args.len() != 1 {
        return Frame::error(CommandError::wrong_arity("keys").to_string());
    }
    Frame::Array(
        server
            .kv()
            .keys(&args[0])
            .into_iter()
            .map(Frame::simple)
            .collect(),
    )
}

/// `TYPE key` replies `string`, `stream`, or `none`.
pub fn type_cmd(server: &Server, args: &[String]) -> Frame {
    if args.len() != 1 {
        return Frame::error(CommandError::wrong_arity("type").to_string());
    }
    if server.kv().contains(&args[0]) {
        Frame::simple("string")
    } else if server.streams().contains(&args[0]) {
        Frame::simple("stream")
    } else {
        Frame::simple("none")
    }
}
