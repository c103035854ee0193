//! Inline HTML for the two pages the server renders. The session page embeds
//! a WebSocket client that joins the room named by the session id and reacts
//! to `qr` / `status` / `connected` / `error` relay events.

const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>WhatsApp Session Generator</title>
    <style>
        body {
            font-family: Arial, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            margin: 0;
            display: flex;
            align-items: center;
            justify-content: center;
        }
        .container {
            background: white;
            padding: 40px;
            border-radius: 20px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
            text-align: center;
            max-width: 480px;
        }
        button {
            background: #25D366;
            color: white;
            border: none;
            padding: 12px 24px;
            border-radius: 8px;
            cursor: pointer;
            font-size: 16px;
        }
        button:hover { background: #1da851; }
        .error { color: #c0392b; margin-top: 15px; }
    </style>
</head>
<body>
    <div class="container">
        <h1>WhatsApp Session Generator</h1>
        <p>Create a new session and scan the QR code with your phone.</p>
        <button id="generate">Generate Session</button>
        <div class="error" id="error"></div>
    </div>
    <script>
        document.getElementById('generate').addEventListener('click', async () => {
            try {
                const res = await fetch('/api/generate');
                const data = await res.json();
                if (data.success) {
                    window.location.href = '/session/' + data.sessionId;
                } else {
                    document.getElementById('error').textContent = data.message || 'Failed to create session';
                }
            } catch (err) {
                document.getElementById('error').textContent = 'Request failed: ' + err;
            }
        });
    </script>
</body>
</html>
"#;

const SESSION_PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>WhatsApp Session Generator</title>
    <style>
        body {
            font-family: Arial, sans-serif;
            max-width: 800px;
            margin: 0 auto;
            padding: 20px;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
        }
        .container {
            background: white;
            padding: 40px;
            border-radius: 20px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
            text-align: center;
            width: 100%;
        }
        .status {
            background: #f8f9fa;
            padding: 15px;
            border-radius: 10px;
            margin: 20px 0;
            min-height: 24px;
        }
        #qr-container {
            margin: 30px auto;
            padding: 20px;
            border: 2px dashed #ddd;
            border-radius: 15px;
            max-width: 300px;
        }
        #qr-container img { max-width: 100%; }
        #session-data { display: none; margin-top: 30px; text-align: left; }
        textarea {
            width: 100%;
            height: 120px;
            padding: 15px;
            border: 2px solid #ddd;
            border-radius: 10px;
            font-family: monospace;
            margin: 15px 0;
            resize: vertical;
        }
        button {
            background: #25D366;
            color: white;
            border: none;
            padding: 12px 24px;
            border-radius: 8px;
            cursor: pointer;
            font-size: 16px;
            margin: 5px;
        }
        button:hover { background: #1da851; }
    </style>
</head>
<body>
    <div class="container">
        <h1>WhatsApp Session Generator</h1>
        <p>Session ID: __SESSION_ID_HTML__</p>

        <div class="status" id="status">Initializing session...</div>
        <div id="qr-container"></div>

        <div id="session-data">
            <h3>Session generated successfully</h3>
            <p><strong>Copy this to your bot's config:</strong></p>
            <textarea id="session-string" readonly></textarea>
            <div>
                <button onclick="copySession()">Copy Session</button>
                <button onclick="downloadSession()">Download</button>
                <button onclick="newSession()">New Session</button>
            </div>
            <div id="session-info"></div>
        </div>
    </div>

    <script>
        const sessionId = '__SESSION_ID_JS__';
        const scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
        const ws = new WebSocket(scheme + location.host + '/ws/' + sessionId);

        ws.onopen = () => {
            ws.send(JSON.stringify({ type: 'join', session_id: sessionId }));
        };

        ws.onmessage = (event) => {
            const msg = JSON.parse(event.data);
            if (msg.type === 'qr') {
                document.getElementById('status').textContent = 'Scan the QR code with WhatsApp';
                document.getElementById('qr-container').innerHTML =
                    '<img src="' + msg.image + '" alt="QR Code">';
            } else if (msg.type === 'status') {
                document.getElementById('status').textContent = msg.message;
            } else if (msg.type === 'connected') {
                const data = msg.payload;
                document.getElementById('qr-container').innerHTML = '';
                document.getElementById('session-data').style.display = 'block';
                document.getElementById('session-string').value =
                    "SESSION_ID='" + data.sessionString.replace(/'/g, "\\'") + "'";
                document.getElementById('session-info').innerHTML =
                    '<p><strong>User ID:</strong> ' + ((data.userInfo && data.userInfo.id) || 'N/A') + '</p>' +
                    '<p><strong>JSON length:</strong> ' + data.sessionString.length + ' characters</p>' +
                    '<p><strong>Base64 length:</strong> ' + data.base64String.length + ' characters</p>';
                document.getElementById('status').textContent = 'Session ready. Copy below.';
            } else if (msg.type === 'error') {
                document.getElementById('status').textContent = 'Error: ' + msg.message;
                document.getElementById('qr-container').innerHTML = '';
            }
        };

        ws.onclose = () => {
            const status = document.getElementById('status');
            if (!status.textContent.startsWith('Session ready')) {
                status.textContent = 'Connection to server lost';
            }
        };

        function copySession() {
            const textarea = document.getElementById('session-string');
            textarea.select();
            document.execCommand('copy');
        }

        function downloadSession() {
            const blob = new Blob([document.getElementById('session-string').value],
                { type: 'text/plain' });
            const url = URL.createObjectURL(blob);
            const a = document.createElement('a');
            a.href = url;
            a.download = 'whatsapp-session.txt';
            document.body.appendChild(a);
            a.click();
            document.body.removeChild(a);
            URL.revokeObjectURL(url);
        }

        function newSession() {
            window.location.href = '/';
        }
    </script>
</body>
</html>
"#;

pub fn landing_page() -> &'static str {
    LANDING_PAGE
}

/// Render the per-session page. The id lands in visible text and inside a
/// single-quoted script literal; each occurrence gets the escaping its
/// context actually decodes, so the room joined matches the id displayed.
pub fn session_page(session_id: &str) -> String {
    SESSION_PAGE_TEMPLATE
        .replace("__SESSION_ID_HTML__", &escape_html(session_id))
        .replace("__SESSION_ID_JS__", &escape_js(session_id))
}

fn escape_html(raw: &str) -> String {
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

fn escape_js(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            // Keep "</script>" unrepresentable inside the literal.
            '<' => out.push_str("\\x3c"),
            '>' => out.push_str("\\x3e"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_page_embeds_id_exactly() {
        let page = session_page("sess_1700000000000abc123xyz");
        assert!(page.contains("Session ID: sess_1700000000000abc123xyz"));
        assert!(page.contains("const sessionId = 'sess_1700000000000abc123xyz'"));
    }

    #[test]
    fn session_page_escapes_markup() {
        let page = session_page("<script>alert(1)</script>");
        assert!(!page.contains("<script>alert"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("\\x3cscript\\x3e"));
    }

    #[test]
    fn script_literal_keeps_quoted_id_joinable() {
        let page = session_page("sess_o'brien\\x");
        // The script literal decodes back to the raw id; only the visible
        // text uses HTML entities.
        assert!(page.contains("const sessionId = 'sess_o\\'brien\\\\x'"));
        assert!(page.contains("Session ID: sess_o&#39;brien\\x"));
        assert!(!page.contains("&#39;brien'"));
    }
}
