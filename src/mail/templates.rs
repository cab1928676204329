use super::EmailMessage;

const PRODUCT_NAME: &str = "IASQ AI";

fn subject(prefix: &str, subject: &str) -> String {
    if prefix.is_empty() {
        subject.to_string()
    } else {
        format!("{} {}", prefix.trim_end(), subject)
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn html_page(body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family:Arial,sans-serif;color:#222;\">{}\
<p style=\"color:#888;font-size:12px;\">The {} team</p></body></html>",
        body, PRODUCT_NAME
    )
}

pub fn welcome(to: &str, first_name: &str, subject_prefix: &str) -> EmailMessage {
    let text_body = format!(
        "Hi {name},\n\n\
Welcome to {product}! Your account is ready.\n\n\
Upload your course files and we will turn them into summaries, flashcards and quizzes.\n\n\
The {product} team\n",
        name = first_name,
        product = PRODUCT_NAME,
    );

    let html_body = html_page(&format!(
        "<h2>Welcome to {product}!</h2>\
<p>Hi {name},</p>\
<p>Your account is ready. Upload your course files and we will turn them into \
summaries, flashcards and quizzes.</p>",
        name = escape_html(first_name),
        product = PRODUCT_NAME,
    ));

    EmailMessage {
        to: to.to_string(),
        subject: subject(subject_prefix, &format!("Welcome to {}! Your AI Journey Starts Now", PRODUCT_NAME)),
        text_body,
        html_body,
    }
}

pub fn password_reset_otp(
    to: &str,
    first_name: &str,
    code: &str,
    lifetime_minutes: u64,
    subject_prefix: &str,
) -> EmailMessage {
    let text_body = format!(
        "Hi {name},\n\n\
Your password reset code is: {code}\n\n\
It expires in {minutes} minutes. If you did not ask to reset your password, ignore this email.\n\n\
The {product} team\n",
        name = first_name,
        code = code,
        minutes = lifetime_minutes,
        product = PRODUCT_NAME,
    );

    let html_body = html_page(&format!(
        "<p>Hi {name},</p>\
<p>Your password reset code is:</p>\
<p style=\"font-size:28px;letter-spacing:6px;font-weight:bold;\">{code}</p>\
<p>It expires in {minutes} minutes. If you did not ask to reset your password, ignore this email.</p>",
        name = escape_html(first_name),
        code = escape_html(code),
        minutes = lifetime_minutes,
    ));

    EmailMessage {
        to: to.to_string(),
        subject: subject(subject_prefix, "Your password reset code"),
        text_body,
        html_body,
    }
}
