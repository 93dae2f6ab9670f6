use peerhttp::http::parser::{Limits, Message, ParseError, Parsed, Parser, Role, Status};
use peerhttp::http::request::{Method, RequestBuilder, Version};
use peerhttp::http::response::StatusCode;
use peerhttp::http::writer::serialize_request;

fn request_parser() -> Parser {
    Parser::new(Role::Request, Limits::default())
}

fn response_parser() -> Parser {
    Parser::new(Role::Response, Limits::default())
}

fn parse_one(role: Role, input: &[u8]) -> Parsed {
    let mut parser = Parser::new(role, Limits::default());
    let mut done = parser.feed(input).unwrap();
    assert_eq!(done.len(), 1, "expected exactly one message");
    done.remove(0)
}

fn feed_bytewise(role: Role, input: &[u8]) -> Vec<Parsed> {
    let mut parser = Parser::new(role, Limits::default());
    let mut done = Vec::new();
    for byte in input {
        done.extend(parser.feed(std::slice::from_ref(byte)).unwrap());
    }
    done
}

#[test]
fn test_parse_simple_get_request() {
    let parsed = parse_one(Role::Request, b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
    let req = parsed.message.into_request().unwrap();

    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/");
    assert_eq!(req.version, Version::Http11);
    assert_eq!(req.header("Host"), Some("example.com"));
    assert!(req.body.is_empty());
    assert!(parsed.keep_alive);
}

#[test]
fn test_parse_post_request_with_body() {
    let parsed = parse_one(
        Role::Request,
        b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello",
    );
    let req = parsed.message.into_request().unwrap();

    assert_eq!(req.method, Method::POST);
    assert_eq!(req.body, b"hello");
}

#[test]
fn test_chunk_boundaries_do_not_change_the_result() {
    let inputs: [&[u8]; 3] = [
        b"GET /search?q=rust HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n",
        b"POST /rpc HTTP/1.0\r\nContent-Length: 11\r\nConnection: keep-alive\r\n\r\n{\"id\":1234}",
        b"PUT /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n10;ext=1\r\n0123456789abcdef\r\n0\r\nX-Sum: 9\r\n\r\n",
    ];

    for input in inputs {
        let whole = parse_one(Role::Request, input);
        let bytewise = feed_bytewise(Role::Request, input);
        assert_eq!(bytewise, vec![whole.clone()]);

        for split in 1..input.len() {
            let mut parser = request_parser();
            let mut done = parser.feed(&input[..split]).unwrap();
            done.extend(parser.feed(&input[split..]).unwrap());
            assert_eq!(done, vec![whole.clone()], "split at {}", split);
        }
    }
}

#[test]
fn test_content_length_body_split_across_reads() {
    let mut parser = request_parser();

    let first = parser
        .feed(b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc")
        .unwrap();
    assert!(first.is_empty());
    assert!(!parser.is_idle());

    let second = parser.feed(b"de").unwrap();
    assert_eq!(second.len(), 1);

    let req = second[0].message.clone().into_request().unwrap();
    assert_eq!(req.body, b"abcde");
    assert!(parser.is_idle());
}

#[test]
fn test_chunked_body_is_decoded() {
    let parsed = parse_one(
        Role::Response,
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n0\r\n\r\n",
    );
    let res = parsed.message.into_response().unwrap();

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, b"Wiki");
    assert!(parsed.keep_alive);
}

#[test]
fn test_chunked_trailers_are_appended_to_headers() {
    let parsed = parse_one(
        Role::Request,
        b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nok\r\n0\r\nChecksum: abc\r\n\r\n",
    );
    let req = parsed.message.into_request().unwrap();

    assert_eq!(req.body, b"ok");
    assert_eq!(req.header("checksum"), Some("abc"));
}

#[test]
fn test_pipelined_requests_in_one_chunk() {
    let mut parser = request_parser();
    let done = parser
        .feed(b"GET /a HTTP/1.1\r\n\r\nPOST /b HTTP/1.1\r\nContent-Length: 2\r\n\r\nhiGET /c")
        .unwrap();

    let paths: Vec<String> = done
        .into_iter()
        .map(|p| p.message.into_request().unwrap().path)
        .collect();
    assert_eq!(paths, vec!["/a", "/b"]);
    assert!(!parser.is_idle());

    let rest = parser.feed(b" HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(rest[0].message.clone().into_request().unwrap().path, "/c");
}

#[test]
fn test_advance_reports_consumed_bytes() {
    let mut parser = request_parser();
    let input = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";

    match parser.advance(input).unwrap() {
        Status::Complete { consumed, .. } => assert_eq!(consumed, 19),
        Status::Partial => panic!("expected a complete message"),
    }
}

#[test]
fn test_parse_invalid_http_method() {
    let mut parser = request_parser();
    let result = parser.feed(b"FOO /x HTTP/1.1\r\n\r\n");

    assert_eq!(result, Err(ParseError::InvalidMethod));
    assert_eq!(parser.error(), Some(&ParseError::InvalidMethod));

    // Terminal: later input keeps failing.
    assert_eq!(
        parser.feed(b"GET / HTTP/1.1\r\n\r\n"),
        Err(ParseError::InvalidMethod)
    );
}

#[test]
fn test_parse_various_http_methods() {
    for method in Method::ALL {
        let input = format!("{} / HTTP/1.1\r\n\r\n", method);
        let req = parse_one(Role::Request, input.as_bytes())
            .message
            .into_request()
            .unwrap();
        assert_eq!(req.method, method);
    }
}

#[test]
fn test_parse_malformed_header() {
    let mut parser = request_parser();
    let result = parser.feed(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n");

    assert_eq!(result, Err(ParseError::InvalidHeader));
}

#[test]
fn test_non_utf8_header_value_is_rejected() {
    let mut parser = request_parser();
    let result = parser.feed(b"GET / HTTP/1.1\r\nX-Name: caf\xe9\r\n\r\n");

    assert_eq!(result, Err(ParseError::InvalidHeader));
}

#[test]
fn test_folded_header_is_rejected() {
    let mut parser = request_parser();
    let result = parser.feed(b"GET / HTTP/1.1\r\nX-Long: a\r\n  continued\r\n\r\n");

    assert_eq!(result, Err(ParseError::FoldedHeader));
}

#[test]
fn test_unsupported_version_is_rejected() {
    let mut parser = request_parser();
    assert_eq!(
        parser.feed(b"GET / HTTP/2.0\r\n\r\n"),
        Err(ParseError::InvalidVersion)
    );
}

#[test]
fn test_overlong_line_is_rejected() {
    let limits = Limits {
        max_line: 32,
        ..Limits::default()
    };
    let mut parser = Parser::new(Role::Request, limits);
    let path = "/".repeat(64);
    let input = format!("GET {} HTTP/1.1\r\n\r\n", path);

    assert_eq!(
        parser.feed(input.as_bytes()),
        Err(ParseError::LineTooLong { limit: 32 })
    );
}

#[test]
fn test_line_exactly_at_limit_is_accepted() {
    let line = "GET /abcdefgh HTTP/1.1";
    let limits = Limits {
        max_line: line.len(),
        ..Limits::default()
    };
    let mut parser = Parser::new(Role::Request, limits);

    let done = parser.feed(format!("{}\r\n\r\n", line).as_bytes()).unwrap();
    assert_eq!(done.len(), 1);
}

#[test]
fn test_too_many_headers() {
    let limits = Limits {
        max_headers: 2,
        ..Limits::default()
    };
    let mut parser = Parser::new(Role::Request, limits);

    assert_eq!(
        parser.feed(b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n"),
        Err(ParseError::TooManyHeaders { limit: 2 })
    );
}

#[test]
fn test_body_over_limit_is_rejected_up_front() {
    let limits = Limits {
        max_body: 4,
        ..Limits::default()
    };
    let mut parser = Parser::new(Role::Request, limits);

    assert_eq!(
        parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n"),
        Err(ParseError::BodyTooLarge { limit: 4 })
    );
}

#[test]
fn test_conflicting_content_lengths() {
    let mut parser = request_parser();
    assert_eq!(
        parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\nabcd"),
        Err(ParseError::InvalidContentLength)
    );

    let same = parse_one(
        Role::Request,
        b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 3\r\n\r\nabc",
    );
    assert_eq!(same.message.into_request().unwrap().body, b"abc");
}

#[test]
fn test_invalid_chunk_size() {
    let mut parser = request_parser();
    assert_eq!(
        parser.feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n"),
        Err(ParseError::InvalidChunkSize)
    );
}

#[test]
fn test_chunk_data_without_crlf() {
    let mut parser = request_parser();
    assert_eq!(
        parser.feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nabc\r\n"),
        Err(ParseError::InvalidChunkTerminator)
    );
}

#[test]
fn test_truncated_chunk_header_at_eof() {
    let mut parser = request_parser();
    let done = parser
        .feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWi")
        .unwrap();
    assert!(done.is_empty());

    assert_eq!(parser.finish(), Err(ParseError::Truncated));
}

#[test]
fn test_finish_when_idle() {
    let mut parser = request_parser();
    parser.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();

    assert_eq!(parser.finish(), Ok(None));
}

#[test]
fn test_keep_alive_rules() {
    let cases: [(&[u8], bool); 5] = [
        (b"GET / HTTP/1.1\r\n\r\n", true),
        (b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n", false),
        (b"GET / HTTP/1.0\r\n\r\n", false),
        (b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n", true),
        (b"GET / HTTP/1.1\r\nConnection: upgrade, close\r\n\r\n", false),
    ];

    for (input, expected) in cases {
        assert_eq!(parse_one(Role::Request, input).keep_alive, expected);
    }
}

#[test]
fn test_leading_empty_lines_are_skipped() {
    let parsed = parse_one(Role::Request, b"\r\n\r\nGET /x HTTP/1.1\r\n\r\n");
    assert_eq!(parsed.message.into_request().unwrap().path, "/x");
}

#[test]
fn test_request_with_unknown_transfer_encoding() {
    let mut parser = request_parser();
    assert_eq!(
        parser.feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n"),
        Err(ParseError::UnsupportedTransferEncoding)
    );
}

#[test]
fn test_response_read_until_close() {
    let mut parser = response_parser();
    let done = parser
        .feed(b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nsome ")
        .unwrap();
    assert!(done.is_empty());
    assert!(parser.feed(b"bytes").unwrap().is_empty());

    let parsed = parser.finish().unwrap().unwrap();
    assert!(!parsed.keep_alive);

    let res = parsed.message.into_response().unwrap();
    assert_eq!(res.body, b"some bytes");
}

#[test]
fn test_bodyless_responses() {
    let no_content = parse_one(Role::Response, b"HTTP/1.1 204 No Content\r\n\r\n");
    assert!(no_content.message.into_response().unwrap().body.is_empty());

    let mut parser = response_parser();
    parser.expect_head_response();
    let done = parser
        .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 50\r\n\r\n")
        .unwrap();
    assert_eq!(done.len(), 1);
    assert!(parser.is_idle());
}

#[test]
fn test_status_line_variants() {
    let res = parse_one(Role::Response, b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
        .message
        .into_response()
        .unwrap();
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.reason, "Not Found");

    let res = parse_one(Role::Response, b"HTTP/1.1 299\r\nContent-Length: 0\r\n\r\n")
        .message
        .into_response()
        .unwrap();
    assert_eq!(res.status.as_u16(), 299);
    assert_eq!(res.reason(), "Unknown");

    let mut parser = response_parser();
    assert_eq!(
        parser.feed(b"HTTP/1.1 20x OK\r\n\r\n"),
        Err(ParseError::InvalidStatus)
    );
}

#[test]
fn test_serialized_request_parses_back() {
    let original = RequestBuilder::new()
        .method(Method::PROPFIND)
        .path("/calendars/alice")
        .header("Host", "dav.example")
        .header("Depth", "1")
        .header("X-Tag", "a")
        .header("x-tag", "b")
        .header("Content-Length", "7")
        .body(b"<prop/>".to_vec())
        .build()
        .unwrap();

    let wire = serialize_request(&original);
    let parsed = parse_one(Role::Request, &wire);

    assert_eq!(parsed.message, Message::Request(original));
}
