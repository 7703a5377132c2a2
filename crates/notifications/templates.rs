use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::value_objects::notifications::EmailMessage;

/// Everything the post-confirmation emails need, captured after the commit.
#[derive(Debug, Clone)]
pub struct ConfirmationContext {
    pub student_name: String,
    pub student_email: String,
    pub counsellor_name: String,
    pub counsellor_email: Option<String>,
    pub date: NaiveDate,
    pub time_slot: String,
    pub join_url: Option<String>,
    pub start_url: Option<String>,
    pub payment_id: String,
    pub order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub paid_at: DateTime<Utc>,
}

pub fn format_amount(amount_minor: i64, currency: &str) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{currency} {sign}{}.{:02}", abs / 100, abs % 100)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<div style="font-family:Arial,sans-serif;background:#f7f5ff;padding:24px;">
<div style="max-width:600px;margin:auto;background:#ffffff;border-radius:10px;padding:28px;">
<h2 style="color:#5b2bd6;margin-top:0;">{title}</h2>
{body}
</div>
</div>"#
    )
}

fn rows(entries: &[(&str, String)]) -> String {
    let cells: String = entries
        .iter()
        .map(|(label, value)| {
            format!(
                r#"<tr><td style="padding:8px;font-weight:bold;">{label}</td><td style="padding:8px;">{}</td></tr>"#,
                escape(value)
            )
        })
        .collect();
    format!(r#"<table style="width:100%;border-collapse:collapse;">{cells}</table>"#)
}

fn link(label: &str, url: Option<&str>) -> String {
    match url {
        Some(url) => format!(
            r#"<p><a href="{}" style="color:#5b2bd6;">{label}</a></p>"#,
            escape(url)
        ),
        None => "<p>The meeting link will be shared separately.</p>".to_string(),
    }
}

pub fn student_confirmation(ctx: &ConfirmationContext) -> EmailMessage {
    let body = format!(
        "<p>Hi {},</p><p>Your session with {} is confirmed.</p>{}{}",
        escape(&ctx.student_name),
        escape(&ctx.counsellor_name),
        rows(&[
            ("Date", ctx.date.to_string()),
            ("Time", ctx.time_slot.clone()),
        ]),
        link("Join the meeting", ctx.join_url.as_deref()),
    );
    EmailMessage {
        to: ctx.student_email.clone(),
        subject: "Your counselling appointment is confirmed".to_string(),
        html: layout("Appointment confirmed", &body),
    }
}

pub fn counsellor_notification(ctx: &ConfirmationContext) -> Option<EmailMessage> {
    let to = ctx.counsellor_email.clone()?;
    let body = format!(
        "<p>Hi {},</p><p>You have a new appointment.</p>{}{}",
        escape(&ctx.counsellor_name),
        rows(&[
            ("Student", ctx.student_name.clone()),
            ("Student email", ctx.student_email.clone()),
            ("Date", ctx.date.to_string()),
            ("Time", ctx.time_slot.clone()),
        ]),
        link("Start the meeting", ctx.start_url.as_deref()),
    );
    Some(EmailMessage {
        to,
        subject: "You have a new appointment".to_string(),
        html: layout("New appointment", &body),
    })
}

fn receipt_rows(ctx: &ConfirmationContext) -> String {
    rows(&[
        ("Payment ID", ctx.payment_id.clone()),
        ("Order ID", ctx.order_id.clone()),
        ("Amount", format_amount(ctx.amount_minor, &ctx.currency)),
        ("Paid at", ctx.paid_at.format("%Y-%m-%d %H:%M UTC").to_string()),
    ])
}

pub fn student_receipt(ctx: &ConfirmationContext) -> EmailMessage {
    let body = format!(
        "<p>Hi {},</p><p>Thank you for your payment. Here is your receipt.</p>{}",
        escape(&ctx.student_name),
        receipt_rows(ctx),
    );
    EmailMessage {
        to: ctx.student_email.clone(),
        subject: "Payment receipt".to_string(),
        html: layout("Payment successful", &body),
    }
}

pub fn counsellor_receipt(ctx: &ConfirmationContext) -> Option<EmailMessage> {
    let to = ctx.counsellor_email.clone()?;
    let body = format!(
        "<p>Hi {},</p><p>A payment from {} has been processed for your session.</p>{}",
        escape(&ctx.counsellor_name),
        escape(&ctx.student_name),
        receipt_rows(ctx),
    );
    Some(EmailMessage {
        to,
        subject: "Payment processed".to_string(),
        html: layout("Payment processed", &body),
    })
}

/// Confirmation and receipt emails for both parties; counsellor mails are
/// skipped when no counsellor address is known.
pub fn confirmation_emails(ctx: &ConfirmationContext) -> Vec<EmailMessage> {
    let mut messages = vec![student_confirmation(ctx)];
    messages.extend(counsellor_notification(ctx));
    messages.push(student_receipt(ctx));
    messages.extend(counsellor_receipt(ctx));
    messages
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn context() -> ConfirmationContext {
        ConfirmationContext {
            student_name: "Asha <Rao>".to_string(),
            student_email: "asha@example.com".to_string(),
            counsellor_name: "Dev Mehta".to_string(),
            counsellor_email: Some("dev@example.com".to_string()),
            date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            time_slot: "09:00-09:30".to_string(),
            join_url: Some("https://zoom.example.com/j/1".to_string()),
            start_url: Some("https://zoom.example.com/s/1?zak=abc".to_string()),
            payment_id: "pay_1".to_string(),
            order_id: "order_1".to_string(),
            amount_minor: 50_000,
            currency: "INR".to_string(),
            paid_at: Utc.with_ymd_and_hms(2030, 1, 6, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn amounts_render_in_major_units() {
        assert_eq!(format_amount(50_000, "INR"), "INR 500.00");
        assert_eq!(format_amount(1_999, "INR"), "INR 19.99");
        assert_eq!(format_amount(5, "INR"), "INR 0.05");
    }

    #[test]
    fn student_gets_join_url_and_counsellor_gets_start_url() {
        let ctx = context();
        let student = student_confirmation(&ctx);
        let counsellor = counsellor_notification(&ctx).unwrap();

        assert_eq!(student.to, "asha@example.com");
        assert!(student.html.contains("https://zoom.example.com/j/1"));
        assert!(!student.html.contains("zak=abc"));
        assert!(counsellor.html.contains("zak=abc"));
    }

    #[test]
    fn names_are_escaped() {
        let html = student_confirmation(&context()).html;
        assert!(html.contains("Asha &lt;Rao&gt;"));
        assert!(!html.contains("<Rao>"));
    }

    #[test]
    fn missing_counsellor_email_skips_counsellor_mails() {
        let mut ctx = context();
        assert_eq!(confirmation_emails(&ctx).len(), 4);

        ctx.counsellor_email = None;
        let messages = confirmation_emails(&ctx);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.to == "asha@example.com"));
    }

    #[test]
    fn missing_meeting_link_is_mentioned() {
        let mut ctx = context();
        ctx.join_url = None;
        assert!(student_confirmation(&ctx).html.contains("shared separately"));
    }
}
