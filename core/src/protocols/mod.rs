//! Protocol layers correlated on top of TCAP dialogues.
//!
//! Decoding is out of scope: layers consume the decoded facts of
//! [TcapMessage](crate::tcaptrack::TcapMessage).

pub mod camel;
