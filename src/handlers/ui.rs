use axum::{
    response::Html,
    routing::get,
    Router,
};

pub fn ui_routes() -> Router {
    Router::new()
        .route("/", get(speech_master_page))
        .route("/app", get(speech_master_page)) // Alternative route
}

/// Single-page UI: upload, progress, results and chat. All state lives in the
/// server-side session; the page only keeps the session id.
pub async fn speech_master_page() -> Html<&'static str> {
    Html(PAGE)
}

const PAGE: &str = r###"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>SpeechMaster</title>
    <link rel="icon" href="data:image/svg+xml,<svg xmlns=%22http://www.w3.org/2000/svg%22 viewBox=%220 0 100 100%22><text y=%22.9em%22 font-size=%2290%22>💬</text></svg>">
    <style>
        * { box-sizing: border-box; }
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 760px; margin: 0 auto; padding: 24px; line-height: 1.5; color: #1f2933; }
        h1 { margin-bottom: 0; }
        .subtitle { color: #52606d; margin-top: 4px; }
        .msg { padding: 10px 14px; border-radius: 10px; margin: 8px 0; white-space: pre-wrap; }
        .assistant { background: #f0f4f8; }
        .user { background: #e3f2fd; margin-left: 40px; }
        .error { background: #fdecea; color: #b71c1c; }
        .upload-area { border: 2px dashed #cbd2d9; border-radius: 10px; padding: 24px; text-align: center; margin: 16px 0; }
        .upload-area.drag { border-color: #2680c2; background: #f5f7fa; }
        .progress { height: 10px; background: #e4e7eb; border-radius: 5px; overflow: hidden; margin: 8px 0; }
        .progress > div { height: 100%; width: 0; background: #2680c2; transition: width 0.3s; }
        .metric { border: 1px solid #e4e7eb; border-radius: 10px; padding: 12px 16px; margin: 16px 0; }
        .metric .label { color: #52606d; font-size: 0.9em; }
        .metric .value { font-size: 1.8em; font-weight: 600; }
        video { width: 100%; border-radius: 10px; margin: 12px 0; }
        form.chat { display: flex; gap: 8px; margin-top: 12px; }
        form.chat input { flex: 1; padding: 10px; border: 1px solid #cbd2d9; border-radius: 8px; }
        button { background: #2680c2; color: white; border: none; border-radius: 8px; padding: 10px 16px; cursor: pointer; }
        button:disabled { background: #9aa5b1; cursor: default; }
        .hidden { display: none; }
    </style>
</head>
<body>
    <h1>💬 SpeechMaster</h1>
    <p class="subtitle">An assistant for assessing the quality of public speeches</p>

    <div id="messages"></div>

    <div class="upload-area" id="uploadArea">
        <p>Upload a video file (MP4, MPEG4)</p>
        <input type="file" id="fileInput" accept=".mp4,.mpeg4,video/mp4" style="display: none;">
        <button id="chooseButton" onclick="document.getElementById('fileInput').click()">Choose file</button>
    </div>

    <div id="progressBox" class="hidden">
        <div class="progress"><div id="progressBar"></div></div>
        <div id="progressText"></div>
        <button id="retryButton" class="hidden" onclick="retryAnalysis()">Retry analysis</button>
    </div>

    <div id="results" class="hidden">
        <div class="metric">
            <div class="label">Video volume</div>
            <div class="value" id="volumeMetric"></div>
        </div>
        <div class="msg assistant" id="srtBlock"></div>
        <div class="msg assistant" id="transcriptBlock"></div>
        <video id="video" controls class="hidden"></video>

        <div id="chatMessages"></div>
        <form class="chat" id="chatForm">
            <input id="question" placeholder="Ask a question about the analysis of the recording" autocomplete="off">
            <button id="askButton" type="submit">Ask</button>
        </form>
    </div>

    <script>
        const $ = (id) => document.getElementById(id);
        let sessionId = sessionStorage.getItem('speechmaster-session');
        let progressSocket = null;

        async function api(path, options = {}) {
            const response = await fetch(path, options);
            const body = await response.json().catch(() => ({}));
            if (!response.ok) {
                throw new Error(body.error || `Request failed (${response.status})`);
            }
            return body;
        }

        function renderMessages(target, messages) {
            target.innerHTML = '';
            for (const msg of messages) {
                appendMessage(target, msg.role, msg.content);
            }
        }

        function appendMessage(target, role, content) {
            const div = document.createElement('div');
            div.className = `msg ${role}`;
            div.textContent = content;
            target.appendChild(div);
            return div;
        }

        async function ensureSession() {
            if (sessionId) {
                try {
                    return await api(`/api/sessions/${sessionId}`);
                } catch (_) {
                    sessionStorage.removeItem('speechmaster-session');
                }
            }
            const snapshot = await api('/api/sessions', { method: 'POST' });
            sessionId = snapshot.session_id;
            sessionStorage.setItem('speechmaster-session', sessionId);
            return snapshot;
        }

        function showProgress(update) {
            $('progressBox').classList.remove('hidden');
            $('progressBar').style.width = `${Math.round(update.fraction * 100)}%`;
            $('progressText').textContent = update.message || update.stage;
            $('retryButton').classList.toggle('hidden', update.stage !== 'failed');
        }

        function watchProgress() {
            if (progressSocket) return;
            const scheme = location.protocol === 'https:' ? 'wss' : 'ws';
            progressSocket = new WebSocket(`${scheme}://${location.host}/api/sessions/${sessionId}/progress/ws`);
            progressSocket.onmessage = (event) => showProgress(JSON.parse(event.data));
            progressSocket.onclose = () => { progressSocket = null; };
        }

        function showAnalysis(result) {
            const analysis = result.analysis;
            $('results').classList.remove('hidden');
            $('volumeMetric').textContent = analysis.volume_metric || '-';
            $('srtBlock').textContent = 'TRANSCRIPTION SRT:\n' + analysis.transcription_srt;
            $('transcriptBlock').textContent = 'TRANSCRIPTION:\n' + analysis.transcription;
            const video = $('video');
            if (result.video_url && result.subtitled_video_available) {
                video.src = result.video_url;
                video.classList.remove('hidden');
            } else {
                video.classList.add('hidden');
            }
        }

        async function loadChat() {
            const history = await api(`/api/sessions/${sessionId}/chat`);
            renderMessages($('chatMessages'), history.chat_messages);
        }

        async function uploadFile(file) {
            const formData = new FormData();
            formData.append('file', file);
            $('chooseButton').disabled = true;
            showProgress({ fraction: 0, stage: 'upload', message: `Uploading ${file.name}...` });
            watchProgress();
            try {
                const result = await api(`/api/sessions/${sessionId}/upload`, { method: 'POST', body: formData });
                showAnalysis(result);
                await loadChat();
            } catch (error) {
                appendMessage($('messages'), 'error', error.message);
                $('retryButton').classList.remove('hidden');
            } finally {
                $('chooseButton').disabled = false;
            }
        }

        async function retryAnalysis() {
            $('retryButton').classList.add('hidden');
            watchProgress();
            try {
                showAnalysis(await api(`/api/sessions/${sessionId}/analyze`, { method: 'POST' }));
                await loadChat();
            } catch (error) {
                appendMessage($('messages'), 'error', error.message);
                $('retryButton').classList.remove('hidden');
            }
        }

        $('fileInput').addEventListener('change', (e) => {
            if (e.target.files.length > 0) uploadFile(e.target.files[0]);
        });

        const uploadArea = $('uploadArea');
        uploadArea.addEventListener('dragover', (e) => { e.preventDefault(); uploadArea.classList.add('drag'); });
        uploadArea.addEventListener('dragleave', () => uploadArea.classList.remove('drag'));
        uploadArea.addEventListener('drop', (e) => {
            e.preventDefault();
            uploadArea.classList.remove('drag');
            if (e.dataTransfer.files.length > 0) uploadFile(e.dataTransfer.files[0]);
        });

        $('chatForm').addEventListener('submit', async (e) => {
            e.preventDefault();
            const question = $('question').value.trim();
            if (!question) return;
            $('question').value = '';
            $('askButton').disabled = true;
            const chat = $('chatMessages');
            appendMessage(chat, 'user', question);
            const pending = appendMessage(chat, 'assistant', 'Generating an answer...');
            try {
                const turn = await api(`/api/sessions/${sessionId}/chat`, {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ question }),
                });
                pending.textContent = turn.answer.content;
            } catch (error) {
                pending.className = 'msg error';
                pending.textContent = error.message;
                $('question').value = question;
            } finally {
                $('askButton').disabled = false;
            }
        });

        (async () => {
            const snapshot = await ensureSession();
            renderMessages($('messages'), snapshot.messages);
            if (snapshot.progress) showProgress(snapshot.progress);
            if (snapshot.file_processed) {
                showAnalysis(await api(`/api/sessions/${sessionId}/analysis`));
                await loadChat();
            }
        })();
    </script>
</body>
</html>
"###;
