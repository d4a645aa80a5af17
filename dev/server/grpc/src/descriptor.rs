//! Schemas served by the dev server, built at runtime so no `protoc` is needed.
//!
//! Equivalent proto sources:
//! ```proto
//! // pkg/echo.proto
//! syntax = "proto3";
//! package pkg;
//! message EchoRequest { string msg = 1; }
//! message EchoResponse { string msg = 1; }
//! message TypedRequest {
//!   message Inner { string label = 1; repeated int32 values = 2; }
//!   enum Level { LEVEL_UNSPECIFIED = 0; LEVEL_LOW = 1; LEVEL_HIGH = 2; }
//!   int32 count = 1;
//!   int64 total = 2;
//!   uint32 ratio = 3;
//!   double score = 4;
//!   float weight = 5;
//!   bool enabled = 6;
//!   string name = 7;
//!   bytes blob = 8;
//!   Inner inner = 9;
//!   repeated string tags = 10;
//!   map<string, int32> counters = 11;
//!   Level level = 12;
//!   repeated Inner children = 13;
//! }
//! service Svc {
//!   rpc Echo(EchoRequest) returns (EchoResponse);
//!   rpc Slow(EchoRequest) returns (EchoResponse);
//!   rpc Fail(EchoRequest) returns (EchoResponse);
//!   rpc Typed(TypedRequest) returns (TypedRequest);
//!   rpc Chat(stream EchoRequest) returns (stream EchoResponse);
//! }
//!
//! // other/echo.proto
//! syntax = "proto3";
//! package other;
//! import "pkg/echo.proto";
//! service Svc { rpc Echo(pkg.EchoRequest) returns (pkg.EchoResponse); }
//! ```

use prost_reflect::DescriptorPool;
use prost_types::{
    field_descriptor_proto::{Label, Type},
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSet, MessageOptions, MethodDescriptorProto, ServiceDescriptorProto,
};

pub const PKG_FILE: &str = "pkg/echo.proto";
pub const OTHER_FILE: &str = "other/echo.proto";

pub fn file_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet { file: vec![pkg_file(), other_file()] }
}

pub fn pool() -> DescriptorPool {
    DescriptorPool::from_file_descriptor_set(file_descriptor_set())
        .unwrap_or_else(|e| unreachable!("static descriptors must be valid: {}", e))
}

pub fn pkg_file() -> FileDescriptorProto {
    let echo_request = message("EchoRequest", vec![scalar("msg", 1, Type::String)]);
    let echo_response = message("EchoResponse", vec![scalar("msg", 1, Type::String)]);

    let inner = message(
        "Inner",
        vec![scalar("label", 1, Type::String), repeated(scalar("values", 2, Type::Int32))],
    );
    let counters_entry = DescriptorProto {
        options: Some(MessageOptions { map_entry: Some(true), ..Default::default() }),
        ..message("CountersEntry", vec![scalar("key", 1, Type::String), scalar("value", 2, Type::Int32)])
    };
    let level = EnumDescriptorProto {
        name: Some("Level".to_string()),
        value: ["LEVEL_UNSPECIFIED", "LEVEL_LOW", "LEVEL_HIGH"]
            .into_iter()
            .zip(0..)
            .map(|(name, number)| EnumValueDescriptorProto {
                name: Some(name.to_string()),
                number: Some(number),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    let typed_request = DescriptorProto {
        nested_type: vec![inner, counters_entry],
        enum_type: vec![level],
        ..message(
            "TypedRequest",
            vec![
                scalar("count", 1, Type::Int32),
                scalar("total", 2, Type::Int64),
                scalar("ratio", 3, Type::Uint32),
                scalar("score", 4, Type::Double),
                scalar("weight", 5, Type::Float),
                scalar("enabled", 6, Type::Bool),
                scalar("name", 7, Type::String),
                scalar("blob", 8, Type::Bytes),
                typed("inner", 9, Type::Message, ".pkg.TypedRequest.Inner"),
                repeated(scalar("tags", 10, Type::String)),
                repeated(typed("counters", 11, Type::Message, ".pkg.TypedRequest.CountersEntry")),
                typed("level", 12, Type::Enum, ".pkg.TypedRequest.Level"),
                repeated(typed("children", 13, Type::Message, ".pkg.TypedRequest.Inner")),
            ],
        )
    };

    let svc = ServiceDescriptorProto {
        name: Some("Svc".to_string()),
        method: vec![
            method("Echo", ".pkg.EchoRequest", ".pkg.EchoResponse"),
            method("Slow", ".pkg.EchoRequest", ".pkg.EchoResponse"),
            method("Fail", ".pkg.EchoRequest", ".pkg.EchoResponse"),
            method("Typed", ".pkg.TypedRequest", ".pkg.TypedRequest"),
            MethodDescriptorProto {
                client_streaming: Some(true),
                server_streaming: Some(true),
                ..method("Chat", ".pkg.EchoRequest", ".pkg.EchoResponse")
            },
        ],
        ..Default::default()
    };

    FileDescriptorProto {
        name: Some(PKG_FILE.to_string()),
        package: Some("pkg".to_string()),
        message_type: vec![echo_request, echo_response, typed_request],
        service: vec![svc],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

pub fn other_file() -> FileDescriptorProto {
    let svc = ServiceDescriptorProto {
        name: Some("Svc".to_string()),
        method: vec![method("Echo", ".pkg.EchoRequest", ".pkg.EchoResponse")],
        ..Default::default()
    };
    FileDescriptorProto {
        name: Some(OTHER_FILE.to_string()),
        package: Some("other".to_string()),
        dependency: vec![PKG_FILE.to_string()],
        service: vec![svc],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

fn message(name: &str, field: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto { name: Some(name.to_string()), field, ..Default::default() }
}

fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        json_name: Some(name.to_string()),
        ..Default::default()
    }
}

fn typed(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto { type_name: Some(type_name.to_string()), ..scalar(name, number, ty) }
}

fn repeated(field: FieldDescriptorProto) -> FieldDescriptorProto {
    FieldDescriptorProto { label: Some(Label::Repeated as i32), ..field }
}

fn method(name: &str, input: &str, output: &str) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        ..Default::default()
    }
}
