use rand::Rng;

/// Generates a memorable chat key of three 3-letter groups, e.g. "kfa-wez-qum".
pub fn generate_chat_key() -> String {
    let mut rng = rand::thread_rng();
    let mut group = || -> String {
        (0..3)
            .map(|_| (b'a' + rng.gen_range(0..26)) as char)
            .collect()
    };

    format!("{}-{}-{}", group(), group(), group())
}

/// Sanitizes a string for logging (removes newlines, tabs, etc.)
pub fn sanitize_for_logging(s: &str) -> String {
    s.replace('\n', "\\n").replace('\r', "\\r").replace('\t', "\\t")
}
