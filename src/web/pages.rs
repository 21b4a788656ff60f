// HTML pages for the verification flow. Every outcome is a 200 page.

const STYLE: &str = r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
        font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
        background: linear-gradient(135deg, #1a1a2e 0%, #16213e 50%, #0f3460 100%);
        min-height: 100vh;
        display: flex;
        align-items: center;
        justify-content: center;
        color: #e0e0e0;
    }
    .card {
        background: rgba(255, 255, 255, 0.05);
        border: 1px solid __BORDER__;
        border-radius: 16px;
        padding: 40px;
        max-width: 440px;
        width: 90%;
        text-align: center;
        box-shadow: 0 8px 32px rgba(0, 0, 0, 0.4);
    }
    .icon { font-size: 3rem; margin-bottom: 16px; }
    h1 { font-size: 1.6rem; margin-bottom: 8px; color: __HEADING__; }
    p { font-size: 0.95rem; color: #b0b0b0; margin-bottom: 24px; }
    .h-captcha { display: flex; justify-content: center; margin-bottom: 24px; }
    button {
        background: #5865F2;
        color: #fff;
        border: none;
        padding: 12px 32px;
        border-radius: 8px;
        font-size: 1rem;
        cursor: pointer;
    }
"#;

fn page(title: &str, border: &str, heading: &str, head_extra: &str, body: &str) -> String {
    let style = STYLE
        .replace("__BORDER__", border)
        .replace("__HEADING__", heading);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{title}</title>\n{head_extra}<style>{style}</style>\n</head>\n\
         <body>\n<div class=\"card\">\n{body}\n</div>\n</body>\n</html>"
    )
}

/// Minimal escaping for text placed inside HTML.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// The captcha form. The token is embedded in the form action.
pub fn challenge(token: &str, site_key: &str) -> String {
    let body = format!(
        "<div class=\"icon\">🔒</div>\n<h1>Discord Verification</h1>\n\
         <p>Complete the captcha below to verify your account and gain access to the server.</p>\n\
         <form method=\"POST\" action=\"/verify/{token}\">\n\
         <div class=\"h-captcha\" data-sitekey=\"{site_key}\"></div>\n\
         <button type=\"submit\">Verify Me</button>\n</form>",
        token = escape(token),
        site_key = escape(site_key),
    );
    page(
        "Discord Verification",
        "rgba(255, 255, 255, 0.1)",
        "#fff",
        "<script src=\"https://js.hcaptcha.com/1/api.js\" async defer></script>\n",
        &body,
    )
}

pub fn success() -> String {
    page(
        "Verified!",
        "rgba(46, 204, 113, 0.3)",
        "#2ecc71",
        "",
        "<div class=\"icon\">✅</div>\n<h1>Verified Successfully!</h1>\n\
         <p>You now have access to the server. You can close this page.</p>",
    )
}

pub fn error(message: &str) -> String {
    let body = format!(
        "<div class=\"icon\">❌</div>\n<h1>Verification Failed</h1>\n<p>{}</p>",
        escape(message)
    );
    page(
        "Verification Failed",
        "rgba(231, 76, 60, 0.3)",
        "#e74c3c",
        "",
        &body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_embeds_token_and_site_key() {
        let html = challenge("abc.def.ghi", "site-123");
        assert!(html.contains("action=\"/verify/abc.def.ghi\""));
        assert!(html.contains("data-sitekey=\"site-123\""));
        assert!(html.contains("js.hcaptcha.com"));
    }

    #[test]
    fn test_error_is_escaped() {
        let html = error("<script>alert(1)</script>");
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
