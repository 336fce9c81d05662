//! Connection and server introspection commands: PING, ECHO, INFO, CONFIG.

use crate::error::CommandError;
use crate::protocol::Frame;
use crate::server::Server;

/// `PING [message]` replies PONG, or echoes the message back.
pub fn ping(args: &[String]) -> Frame {
    match args.first() {
        Some(msg) => Frame::simple(msg.clone()),
        None => Frame::pong(),
    }
}

/// `ECHO message`
pub fn echo(args: &[String]) -> Frame {
    Frame::simple(args.first().cloned().unwrap_or_default())
}

/// `INFO replication`; other sections reply null.
pub async fn info(server: &Server, args: &[String]) -> Frame {
    if args.len() != 1 || args[0] != "replication" {
        return Frame::Null;
    }
    let payload = format!(
        "# Replication\nrole:{}\nmaster_replid:{}\nmaster_repl_offset:{}\n",
        server.role().as_str(),
        server.repl_id(),
        server.offset().await,
    );
    Frame::bulk(payload)
}

/// `CONFIG GET dir|dbfilename`: anything but `dir` falls through to
/// `dbfilename`.
pub fn config(server: &Server, args: &[String]) -> Frame {
    if args.len() < 2 || !args[0].eq_ignore_ascii_case("GET") {
        return Frame::error(CommandError::UnknownSubcommand.to_string());
    }
    if args[1].eq_ignore_ascii_case("dir") {
        Frame::Array(vec![
            Frame::simple("dir"),
            Frame::simple(server.config().dir_value()),
        ])
    } else {
        Frame::Array(vec![
            Frame::simple("dbfilename"),
            Frame::simple(server.config().dbfilename_value()),
        ])
    }
}
