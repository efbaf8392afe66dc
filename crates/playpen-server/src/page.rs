//! Embedded browser page for poking at the service by hand.
//!
//! One self-contained HTML document, no assets, no build step. The
//! language selector is populated server-side so the page always matches
//! the configured registry.

const LANGUAGE_OPTIONS_MARKER: &str = "<!-- language-options -->";

/// Render the index page for the given supported languages.
pub fn render_index(languages: &[&str]) -> String {
    // Language names come from operator configuration, not request input.
    let options: String = languages
        .iter()
        .map(|language| format!("<option value=\"{0}\">{0}</option>", language))
        .collect();
    INDEX_TEMPLATE.replace(LANGUAGE_OPTIONS_MARKER, &options)
}

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Playpen</title>
<style>
  body { font-family: ui-monospace, monospace; margin: 2rem auto; max-width: 56rem; color: #222; }
  h1 { font-size: 1.3rem; }
  textarea { width: 100%; height: 14rem; font-family: inherit; font-size: 0.9rem; }
  select, button { font-family: inherit; padding: 0.3rem 0.8rem; margin-right: 0.5rem; }
  pre { background: #f4f4f4; padding: 0.8rem; white-space: pre-wrap; min-height: 2rem; }
  pre.failed { background: #fbeaea; }
  .entry { border-bottom: 1px solid #ddd; padding: 0.4rem 0; font-size: 0.85rem; }
  .entry .meta { color: #777; }
</style>
</head>
<body>
<h1>Playpen</h1>
<p>Runs the code below in a disposable sandbox and shows what came back.</p>
<div>
  <select id="language">
  <!-- language-options -->
  </select>
  <button id="run">Run</button>
</div>
<textarea id="code" spellcheck="false">print("hello from the sandbox")</textarea>
<h2>Result</h2>
<pre id="result"></pre>
<h2>History <button id="clear">Clear</button></h2>
<div id="history"></div>
<script>
const resultBox = document.getElementById('result');
const historyBox = document.getElementById('history');

async function run() {
  const body = {
    language: document.getElementById('language').value,
    code: document.getElementById('code').value,
  };
  resultBox.textContent = 'running...';
  resultBox.className = '';
  const response = await fetch('/run', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify(body),
  });
  const payload = await response.json();
  if (response.ok) {
    resultBox.textContent = payload.output;
  } else {
    resultBox.className = 'failed';
    resultBox.textContent = payload.error + (payload.details ? '\n\n' + payload.details : '');
  }
  await loadHistory();
}

async function loadHistory() {
  const response = await fetch('/history');
  const payload = await response.json();
  historyBox.replaceChildren(...payload.history.map(entry => {
    const div = document.createElement('div');
    div.className = 'entry';
    const meta = document.createElement('div');
    meta.className = 'meta';
    const when = new Date(entry.timestamp * 1000).toLocaleTimeString();
    meta.textContent = '#' + entry.id + ' ' + entry.language + ' at ' + when
      + ' (' + entry.duration.toFixed(2) + 's)';
    const text = document.createElement('div');
    text.textContent = entry.error ? entry.error : entry.output;
    div.append(meta, text);
    return div;
  }));
}

async function clearHistory() {
  await fetch('/history/clear', { method: 'POST' });
  await loadHistory();
}

document.getElementById('run').addEventListener('click', run);
document.getElementById('clear').addEventListener('click', clearHistory);
loadHistory();
</script>
</body>
</html>
"#;
