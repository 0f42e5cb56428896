//! End-to-end packet classification scenarios.

use std::io::Write;
use std::time::Duration;

use radius_cacher::action::Action;
use radius_cacher::parser::Parser;

const CODE_REQUEST: u8 = 4;
const CODE_RESPONSE: u8 = 5;

struct PacketBuilder {
    body: Vec<u8>,
}

impl PacketBuilder {
    fn new() -> Self {
        Self { body: Vec::new() }
    }

    fn acct_status_type(mut self, value: u32) -> Self {
        self.body.push(40);
        self.body.push(6);
        self.body.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn acct_status_type_with_length(mut self, value: u32, length: u8) -> Self {
        self.body.push(40);
        self.body.push(length);
        self.body.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn framed_ip_address(mut self, octets: [u8; 4]) -> Self {
        self.body.push(8);
        self.body.push(6);
        self.body.extend_from_slice(&octets);
        self
    }

    fn user_name(mut self, name: &str) -> Self {
        self.body.push(1);
        self.body.push(2 + name.len() as u8);
        self.body.extend_from_slice(name.as_bytes());
        self
    }

    fn build(self, code: u8) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.push(code);
        packet.push(0); // id
        let length = 20 + self.body.len();
        packet.extend_from_slice(&(length as u16).to_be_bytes());
        packet.extend_from_slice(&[0u8; 16]); // authenticator
        packet.extend_from_slice(&self.body);
        packet
    }
}

fn parser_with_filter(entries: &str) -> (Parser, tempfile::NamedTempFile) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(entries.as_bytes()).unwrap();
    file.flush().unwrap();
    let parser = Parser::new(file.path(), Duration::ZERO);
    (parser, file)
}

#[test]
fn start_store() {
    let (parser, _filter_guard) = parser_with_filter("");
    let packet = PacketBuilder::new()
        .acct_status_type(1)
        .framed_ip_address([192, 168, 10, 22])
        .user_name("987654321")
        .build(CODE_REQUEST);

    let action = parser.parse(packet.len(), &packet);
    assert_eq!(action, Action::Store { key: "192.168.10.22".to_string(), value: "987654321".to_string() });
}

#[test]
fn stop_remove() {
    let (parser, _filter_guard) = parser_with_filter("");
    let packet = PacketBuilder::new()
        .acct_status_type(2)
        .framed_ip_address([192, 168, 10, 22])
        .user_name("987654321")
        .build(CODE_REQUEST);

    let action = parser.parse(packet.len(), &packet);
    assert_eq!(action, Action::Remove { key: "192.168.10.22".to_string(), value: "987654321".to_string() });
}

#[test]
fn filter_suppresses() {
    let (parser, _filter_guard) = parser_with_filter("1234567890123456\n");
    let packet = PacketBuilder::new()
        .acct_status_type(1)
        .user_name("1234567890123456")
        .framed_ip_address([192, 168, 10, 22])
        .build(CODE_REQUEST);

    let action = parser.parse(packet.len(), &packet);
    assert_eq!(action, Action::Filter { key: None, value: "1234567890123456".to_string() });
}

#[test]
fn filter_suppresses_on_leading_digit_run() {
    let (parser, _filter_guard) = parser_with_filter("1234567890123456\n");
    let packet = PacketBuilder::new()
        .acct_status_type(1)
        .user_name("1234567890123456-suffix")
        .framed_ip_address([192, 168, 10, 22])
        .build(CODE_REQUEST);

    let action = parser.parse(packet.len(), &packet);
    assert_eq!(action, Action::Filter { key: None, value: "1234567890123456-suffix".to_string() });
}

#[test]
fn non_request_rejected() {
    let (parser, _filter_guard) = parser_with_filter("");
    let packet = PacketBuilder::new()
        .acct_status_type(1)
        .framed_ip_address([192, 168, 10, 22])
        .user_name("987654321")
        .build(CODE_RESPONSE);

    assert_eq!(parser.parse(packet.len(), &packet), Action::DoNothing);
}

#[test]
fn missing_value_is_do_nothing() {
    let (parser, _filter_guard) = parser_with_filter("");
    let packet =
        PacketBuilder::new().acct_status_type(1).framed_ip_address([192, 168, 10, 22]).build(CODE_REQUEST);

    assert_eq!(parser.parse(packet.len(), &packet), Action::DoNothing);
}

#[test]
fn corrupted_length_is_do_nothing() {
    let (parser, _filter_guard) = parser_with_filter("");
    let packet = PacketBuilder::new()
        .acct_status_type_with_length(1, 2)
        .framed_ip_address([192, 168, 10, 22])
        .user_name("987654321")
        .build(CODE_REQUEST);

    assert_eq!(parser.parse(packet.len(), &packet), Action::DoNothing);
}

#[test]
fn header_length_20_with_no_attributes_is_do_nothing() {
    let (parser, _filter_guard) = parser_with_filter("");
    let packet = PacketBuilder::new().build(CODE_REQUEST);
    assert_eq!(parser.parse(packet.len(), &packet), Action::DoNothing);
}

#[test]
fn declared_length_past_bytes_received_is_do_nothing() {
    let (parser, _filter_guard) = parser_with_filter("");
    let mut packet = PacketBuilder::new()
        .acct_status_type(1)
        .framed_ip_address([192, 168, 10, 22])
        .user_name("987654321")
        .build(CODE_REQUEST);
    let bogus_length = (packet.len() + 50) as u16;
    packet[2..4].copy_from_slice(&bogus_length.to_be_bytes());

    assert_eq!(parser.parse(packet.len(), &packet), Action::DoNothing);
}

#[test]
fn user_name_at_max_size_is_accepted() {
    let (parser, _filter_guard) = parser_with_filter("");
    let name: String = "9".repeat(253);
    let packet = PacketBuilder::new()
        .acct_status_type(1)
        .framed_ip_address([192, 168, 10, 22])
        .user_name(&name)
        .build(CODE_REQUEST);

    let action = parser.parse(packet.len(), &packet);
    assert_eq!(action, Action::Store { key: "192.168.10.22".to_string(), value: name });
}

#[test]
fn parse_is_idempotent() {
    let (parser, _filter_guard) = parser_with_filter("");
    let packet = PacketBuilder::new()
        .acct_status_type(1)
        .framed_ip_address([192, 168, 10, 22])
        .user_name("987654321")
        .build(CODE_REQUEST);

    let first = parser.parse(packet.len(), &packet);
    let second = parser.parse(packet.len(), &packet);
    assert_eq!(first, second);
}
