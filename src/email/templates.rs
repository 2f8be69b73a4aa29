use crate::verification::repo_types::Purpose;

pub struct Rendered {
    pub subject: String,
    pub html: String,
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><body style="font-family:Arial,sans-serif;color:#1f2937;">
<div style="max-width:560px;margin:0 auto;padding:24px;">
<h2 style="color:#4f46e5;">{title}</h2>
{body}
<p style="margin-top:32px;font-size:12px;color:#6b7280;">Websites Arena</p>
</div></body></html>"#,
        title = escape_html(title),
    )
}

pub fn verification_code(name: &str, code: &str, purpose: Purpose) -> Rendered {
    let (subject, intro) = match purpose {
        Purpose::Signup => (
            "Verify your email address",
            "Use the code below to finish creating your account.",
        ),
        Purpose::AdminLogin => (
            "Admin login verification code",
            "Use the code below to complete the admin sign in.",
        ),
        Purpose::AccountDeletion => (
            "Confirm account deletion",
            "Use the code below to permanently delete your account. If you did not ask for this, ignore this email.",
        ),
    };
    let body = format!(
        r#"<p>Hi {name},</p>
<p>{intro}</p>
<p style="font-size:28px;letter-spacing:6px;font-weight:bold;"><span>{code}</span></p>
<p>The code expires in 15 minutes.</p>"#,
        name = escape_html(name),
    );
    Rendered {
        subject: subject.to_string(),
        html: layout(subject, &body),
    }
}

pub fn activity_notice(developer_name: &str, title: &str, description: &str, when: Option<&str>) -> Rendered {
    let when = when
        .map(|w| format!("<p><strong>When:</strong> {}</p>", escape_html(w)))
        .unwrap_or_default();
    let body = format!(
        r#"<p>Hi {name},</p>
<p>A new activity was posted:</p>
<h3>{title}</h3>
<p>{description}</p>
{when}"#,
        name = escape_html(developer_name),
        title = escape_html(title),
        description = escape_html(description),
    );
    Rendered {
        subject: format!("New activity: {title}"),
        html: layout("New activity", &body),
    }
}

pub fn contact_notice(name: &str, email: &str, subject: Option<&str>, message: &str) -> Rendered {
    let subject_line = subject.unwrap_or("New contact message");
    let body = format!(
        r#"<p><strong>From:</strong> {name} &lt;{email}&gt;</p>
<p><strong>Subject:</strong> {subject}</p>
<p style="white-space:pre-wrap;">{message}</p>"#,
        name = escape_html(name),
        email = escape_html(email),
        subject = escape_html(subject_line),
        message = escape_html(message),
    );
    Rendered {
        subject: format!("New message from {name}: {subject_line}"),
        html: layout("New contact message", &body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }

    #[test]
    fn code_is_wrapped_for_extraction() {
        let r = verification_code("Ada", "012345", Purpose::Signup);
        assert!(r.html.contains("<span>012345</span>"));
        assert_eq!(r.subject, "Verify your email address");
    }

    #[test]
    fn user_content_is_escaped_in_notices() {
        let r = contact_notice("<script>", "a@b.co", None, "hi & bye");
        assert!(!r.html.contains("<script>"));
        assert!(r.html.contains("hi &amp; bye"));
    }
}
