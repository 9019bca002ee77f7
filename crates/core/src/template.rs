use crate::{error::Result, render::SummaryDocument};

/// Turns the navigation data into the final page.
pub trait SummaryTemplate: Send + Sync {
    fn render(&self, doc: &SummaryDocument) -> Result<String>;
}

/// Self-contained HTML page with an embedded player. Output depends only on
/// the document, so re-rendering the same inputs is byte-identical.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlTemplate;

static STYLE: &str = r#"body {
  font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
  line-height: 1.6;
  max-width: 1200px;
  margin: 0 auto;
  padding: 20px;
  color: #333;
}
.video-container { position: sticky; top: 0; background: #fff; padding: 10px 0; z-index: 1; }
video { max-width: 100%; }
.topic { margin: 40px 0; padding: 20px; background: #f8f9fa; border-radius: 8px; }
.topic h2 { margin-top: 0; color: #2c3e50; }
.timestamp {
  color: #666;
  font-family: monospace;
  background: #eee;
  padding: 2px 6px;
  border-radius: 4px;
  cursor: pointer;
  text-decoration: none;
}
.timestamp:hover { background: #ddd; }
.key-moment { margin: 10px 0; padding: 10px; background: white; border-left: 4px solid #3498db; }
.key-moment .context { color: #777; font-size: 0.9em; margin-top: 4px; }
.takeaway { margin: 10px 0; padding: 10px; background: white; border-left: 4px solid #2ecc71; }
h3 { color: #34495e; margin: 20px 0 10px; }
nav ol { padding-left: 20px; }"#;

static SCRIPT: &str = r#"function seekVideo(seconds) {
  const video = document.getElementById('meeting-video');
  video.currentTime = seconds;
  video.play();
}
document.querySelectorAll('[data-seek]').forEach(function (el) {
  el.addEventListener('click', function (event) {
    event.preventDefault();
    seekVideo(parseFloat(el.dataset.seek));
    history.replaceState(null, '', '#' + el.dataset.anchor);
  });
});"#;

impl SummaryTemplate for HtmlTemplate {
    fn render(&self, doc: &SummaryDocument) -> Result<String> {
        let mut html = String::new();

        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("<meta charset=\"UTF-8\">\n");
        html.push_str(
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
        );
        html.push_str(&format!(
            "<title>Meeting Summary: {}</title>\n",
            escape_html(&doc.title)
        ));
        html.push_str(&format!("<style>\n{}\n</style>\n", STYLE));
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!(
            "<h1>Meeting Summary: {}</h1>\n",
            escape_html(&doc.title)
        ));

        html.push_str("<div class=\"video-container\">\n");
        html.push_str("<video id=\"meeting-video\" controls preload=\"metadata\">\n");
        html.push_str(&format!(
            "<source src=\"{}\">\n",
            escape_html(&doc.media_src)
        ));
        html.push_str("Your browser does not support the video tag.\n</video>\n</div>\n");

        html.push_str("<nav>\n<h2>Topics</h2>\n<ol>\n");
        for topic in &doc.topics {
            html.push_str(&format!(
                "<li><a href=\"#{}\">{}</a> {}</li>\n",
                topic.anchor.id,
                escape_html(&topic.title),
                seek_link(&topic.anchor.id, topic.anchor.seek_seconds, &topic.anchor.label)
            ));
        }
        html.push_str("</ol>\n</nav>\n");

        html.push_str("<div class=\"topics\">\n");
        for topic in &doc.topics {
            html.push_str(&format!(
                "<section class=\"topic\" id=\"{}\">\n",
                topic.anchor.id
            ));
            html.push_str(&format!(
                "<h2>{} {}</h2>\n",
                escape_html(&topic.title),
                seek_link(&topic.anchor.id, topic.anchor.seek_seconds, &topic.anchor.label)
            ));

            if !topic.key_moments.is_empty() {
                html.push_str("<div class=\"key-moments\">\n<h3>Key Moments</h3>\n");
                for moment in &topic.key_moments {
                    html.push_str(&format!(
                        "<div class=\"key-moment\" id=\"{}\">\n{} {}\n",
                        moment.anchor.id,
                        seek_link(
                            &moment.anchor.id,
                            moment.anchor.seek_seconds,
                            &moment.anchor.label
                        ),
                        escape_html(&moment.description)
                    ));
                    if let Some(context) = &moment.context {
                        html.push_str(&format!(
                            "<div class=\"context\">&ldquo;{}&rdquo;</div>\n",
                            escape_html(context)
                        ));
                    }
                    html.push_str("</div>\n");
                }
                html.push_str("</div>\n");
            }

            if !topic.takeaways.is_empty() {
                html.push_str("<div class=\"takeaways\">\n<h3>Key Takeaways</h3>\n");
                for takeaway in &topic.takeaways {
                    html.push_str(&format!(
                        "<div class=\"takeaway\">{}</div>\n",
                        escape_html(takeaway)
                    ));
                }
                html.push_str("</div>\n");
            }

            html.push_str("</section>\n");
        }
        html.push_str("</div>\n");

        html.push_str(&format!("<script>\n{}\n</script>\n", SCRIPT));
        html.push_str("</body>\n</html>\n");

        Ok(html)
    }
}

fn seek_link(anchor_id: &str, seconds: f64, label: &str) -> String {
    format!(
        "<a class=\"timestamp\" href=\"#{id}\" data-anchor=\"{id}\" data-seek=\"{seconds:.3}\">{label}</a>",
        id = anchor_id,
        seconds = seconds,
        label = escape_html(label)
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
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
