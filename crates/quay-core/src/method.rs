//! Known HTTP verbs
//!
//! The kernel classifies the request verb before the request reaches us and
//! reports it as a verb id. Verbs outside this set arrive as `None` together
//! with the raw method text. [`RawRequest`](crate::RawRequest) implementations
//! use [`Method::from_verb_id`] or [`Method::parse`] to fill in
//! [`RawRequest::verb`](crate::RawRequest::verb).

/// Verb the kernel recognises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    Options = 3,
    Get = 4,
    Head = 5,
    Post = 6,
    Put = 7,
    Delete = 8,
    Trace = 9,
    Connect = 10,
    Track = 11,
    Move = 12,
    Copy = 13,
    Propfind = 14,
    Proppatch = 15,
    Mkcol = 16,
    Lock = 17,
    Unlock = 18,
    Search = 19,
}

impl Method {
    /// Map a kernel verb id; ids 0..=2 (unparsed, unknown, invalid) have no known verb
    pub fn from_verb_id(id: u32) -> Option<Self> {
        Some(match id {
            3 => Method::Options,
            4 => Method::Get,
            5 => Method::Head,
            6 => Method::Post,
            7 => Method::Put,
            8 => Method::Delete,
            9 => Method::Trace,
            10 => Method::Connect,
            11 => Method::Track,
            12 => Method::Move,
            13 => Method::Copy,
            14 => Method::Propfind,
            15 => Method::Proppatch,
            16 => Method::Mkcol,
            17 => Method::Lock,
            18 => Method::Unlock,
            19 => Method::Search,
            _ => return None,
        })
    }

    /// Classify method text the way the kernel does: exact, case-sensitive
    ///
    /// For sources that deliver the method as text rather than a verb id.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"OPTIONS" => Some(Method::Options),
            b"GET" => Some(Method::Get),
            b"HEAD" => Some(Method::Head),
            b"POST" => Some(Method::Post),
            b"PUT" => Some(Method::Put),
            b"DELETE" => Some(Method::Delete),
            b"TRACE" => Some(Method::Trace),
            b"CONNECT" => Some(Method::Connect),
            b"TRACK" => Some(Method::Track),
            b"MOVE" => Some(Method::Move),
            b"COPY" => Some(Method::Copy),
            b"PROPFIND" => Some(Method::Propfind),
            b"PROPPATCH" => Some(Method::Proppatch),
            b"MKCOL" => Some(Method::Mkcol),
            b"LOCK" => Some(Method::Lock),
            b"UNLOCK" => Some(Method::Unlock),
            b"SEARCH" => Some(Method::Search),
            _ => None,
        }
    }

    pub fn verb_id(&self) -> u32 {
        *self as u32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Track => "TRACK",
            Method::Move => "MOVE",
            Method::Copy => "COPY",
            Method::Propfind => "PROPFIND",
            Method::Proppatch => "PROPPATCH",
            Method::Mkcol => "MKCOL",
            Method::Lock => "LOCK",
            Method::Unlock => "UNLOCK",
            Method::Search => "SEARCH",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
