//! Build Script for MarketPulse Proto
//!
//! Generates Rust protobuf stubs for `proto/marketpulse/v1/market_data.proto`.
//!
//! The file descriptor set is assembled here from the same message and service
//! definitions as the `.proto` file, then handed to `compile_fds`. This keeps
//! the build free of `protoc` and `buf`.
//!
//! # Panics Policy
//!
//! Build scripts halt the build on failure; there is no caller to propagate
//! errors to.
#![allow(clippy::expect_used)]

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};

const PACKAGE: &str = "marketpulse.v1";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/marketpulse/v1/market_data.proto");

    let file = FileDescriptorProto {
        name: Some("marketpulse/v1/market_data.proto".to_string()),
        package: Some(PACKAGE.to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            message("TickerSubscription", &[("symbol", 1, Type::String)]),
            message(
                "TickerUpdate",
                &[
                    ("symbol", 1, Type::String),
                    ("last_price", 2, Type::Double),
                    ("bid_price", 3, Type::Double),
                    ("ask_price", 4, Type::Double),
                    ("ts_unix_ms", 5, Type::Int64),
                ],
            ),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("MarketDataStreamer".to_string()),
            method: vec![MethodDescriptorProto {
                name: Some("StreamTickers".to_string()),
                input_type: Some(format!(".{PACKAGE}.TickerSubscription")),
                output_type: Some(format!(".{PACKAGE}.TickerUpdate")),
                client_streaming: Some(false),
                server_streaming: Some(true),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_fds(FileDescriptorSet { file: vec![file] })
        .expect("Failed to compile protobuf definitions");
}

fn message(name: &str, fields: &[(&str, i32, Type)]) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields
            .iter()
            .map(|&(field_name, number, kind)| FieldDescriptorProto {
                name: Some(field_name.to_string()),
                json_name: Some(lower_camel(field_name)),
                number: Some(number),
                label: Some(Label::Optional as i32),
                r#type: Some(kind as i32),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn lower_camel(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;
    for c in snake.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
