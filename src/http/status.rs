//! Canonical reason phrases
//!
//! Upper-case phrases are used on the status line; the capitalized form is
//! the body of default error responses.

/// Reason phrase for a status code, upper-case
pub const fn reason_phrase(status: u16) -> Option<&'static str> {
    let phrase = match status {
        100 => "CONTINUE",
        101 => "SWITCHING PROTOCOLS",
        200 => "OK",
        201 => "CREATED",
        202 => "ACCEPTED",
        203 => "NON-AUTHORITATIVE INFORMATION",
        204 => "NO CONTENT",
        205 => "RESET CONTENT",
        206 => "PARTIAL CONTENT",
        300 => "MULTIPLE CHOICES",
        301 => "MOVED PERMANENTLY",
        302 => "FOUND",
        303 => "SEE OTHER",
        304 => "NOT MODIFIED",
        305 => "USE PROXY",
        306 => "RESERVED",
        307 => "TEMPORARY REDIRECT",
        400 => "BAD REQUEST",
        401 => "UNAUTHORIZED",
        402 => "PAYMENT REQUIRED",
        403 => "FORBIDDEN",
        404 => "NOT FOUND",
        405 => "METHOD NOT ALLOWED",
        406 => "NOT ACCEPTABLE",
        407 => "PROXY AUTHENTICATION REQUIRED",
        408 => "REQUEST TIMEOUT",
        409 => "CONFLICT",
        410 => "GONE",
        411 => "LENGTH REQUIRED",
        412 => "PRECONDITION FAILED",
        413 => "REQUEST ENTITY TOO LARGE",
        414 => "REQUEST-URI TOO LONG",
        415 => "UNSUPPORTED MEDIA TYPE",
        416 => "REQUESTED RANGE NOT SATISFIABLE",
        417 => "EXPECTATION FAILED",
        500 => "INTERNAL SERVER ERROR",
        501 => "NOT IMPLEMENTED",
        502 => "BAD GATEWAY",
        503 => "SERVICE UNAVAILABLE",
        504 => "GATEWAY TIMEOUT",
        505 => "HTTP VERSION NOT SUPPORTED",
        _ => return None,
    };
    Some(phrase)
}

/// Status line as handed to the gateway, e.g. `404 NOT FOUND`
pub fn status_line(status: u16) -> String {
    format!("{status} {}", reason_phrase(status).unwrap_or("UNKNOWN"))
}

/// Body of a default error response, e.g. `Internal server error`
pub fn default_error_body(status: u16) -> String {
    let phrase = reason_phrase(status).unwrap_or("UNKNOWN STATUS");
    let mut chars = phrase.chars();
    chars.next().map_or_else(String::new, |first| {
        first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect()
    })
}
