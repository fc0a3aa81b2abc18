//! One-time codes: generation, email rendering, and storage.

mod store;

pub use store::{CodeStore, MemoryCodeStore};

use rand::Rng;

/// Subject line of every code email.
pub const SUBJECT: &str = "Your verification code";

/// Generates a zero-padded numeric code of `len` digits.
#[must_use]
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Renders the HTML body of a code email.
#[must_use]
pub fn render_email(brand: &str, code: &str, ttl_minutes: u64) -> String {
    let brand = escape_html(brand);
    let code = escape_html(code);
    format!(
        "<html>\n<body style=\"font-family: sans-serif;\">\n\
         <h2>{brand} sign-in</h2>\n\
         <p>Use the code below to finish signing in.</p>\n\
         <p style=\"font-size: 28px; letter-spacing: 6px;\"><strong>{code}</strong></p>\n\
         <p>The code expires in {ttl_minutes} minutes. If you did not request it, ignore this email.</p>\n\
         </body>\n</html>"
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_shape() {
        for len in [4, 6, 10] {
            let code = generate_code(len);
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_codes_vary() {
        let codes: std::collections::HashSet<_> = (0..50).map(|_| generate_code(10)).collect();
        assert!(codes.len() > 1);
    }

    #[test]
    fn test_render_email() {
        let html = render_email("RustConf", "0421", 10);
        assert!(html.contains("RustConf sign-in"));
        assert!(html.contains("<strong>0421</strong>"));
        assert!(html.contains("expires in 10 minutes"));
    }

    #[test]
    fn test_render_escapes_brand() {
        let html = render_email("<script>", "1234", 5);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
