use axum::response::Html;
use humansize::{format_size, BINARY};
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};

use crate::flash::Flash;
use crate::storage::StoredFile;

/// Render the whole page: flash banner, upload form, file table.
pub fn render_page(
    flash: Option<&Flash>,
    files: &[StoredFile],
    max_upload_bytes: u64,
) -> Html<String> {
    let banner = flash.map(banner_html).unwrap_or_default();

    let listing = if files.is_empty() {
        r#"<p class="empty">No files uploaded yet.</p>"#.to_string()
    } else {
        format!(
            r#"<table>
                <thead>
                    <tr><th>Filename</th><th>Type</th><th>Size (KB)</th><th>Actions</th></tr>
                </thead>
                <tbody>{}</tbody>
            </table>"#,
            files.iter().map(file_row).collect::<String>()
        )
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>File Upload System</title>
    <style>
        {css}
    </style>
</head>
<body>
    <div class="container">
        <h1>&#128193; File Upload System</h1>
        {banner}
        <form action="/" method="post" enctype="multipart/form-data">
            <label for="fileToUpload">Select File to Upload</label>
            <input type="file" name="fileToUpload" id="fileToUpload" required>
            <small>Max file size: {max_size}. All file types are allowed.</small>
            <button type="submit">Upload File</button>
        </form>
        <hr>
        <h2>&#128203; Uploaded Files</h2>
        <div class="file-list">
            {listing}
        </div>
    </div>
</body>
</html>"#,
        banner = banner,
        max_size = format_size(max_upload_bytes, BINARY),
        listing = listing,
        css = r#"
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto,
                "Helvetica Neue", Arial, sans-serif;
            line-height: 1.6;
            background: #f4f6f9;
            color: #333;
        }
        .container {
            max-width: 700px;
            margin: 50px auto;
            padding: 30px;
            background: white;
            border-radius: 10px;
            box-shadow: 0 4px 6px rgba(0,0,0,0.1);
        }
        h1 { text-align: center; margin-bottom: 1.5rem; font-size: 1.6rem; }
        h2 { margin: 1.5rem 0 1rem; font-size: 1.2rem; }
        form label { display: block; margin-bottom: 0.5rem; }
        form input[type="file"] {
            display: block;
            width: 100%;
            padding: 0.5rem;
            border: 1px solid #ccc;
            border-radius: 4px;
        }
        form small { display: block; color: #7f8c8d; margin: 0.4rem 0 1rem; }
        form button {
            width: 100%;
            padding: 0.6rem;
            background: #0d6efd;
            color: white;
            border: none;
            border-radius: 4px;
            cursor: pointer;
        }
        form button:hover { background: #0b5ed7; }
        hr { margin: 1.5rem 0; border: none; border-top: 1px solid #eee; }
        .alert {
            padding: 0.8rem 1rem;
            border-radius: 4px;
            margin-bottom: 1rem;
            display: flex;
            justify-content: space-between;
            align-items: center;
        }
        .alert-success { background: #d1e7dd; color: #0f5132; }
        .alert-danger { background: #f8d7da; color: #842029; }
        .alert .close {
            border: none;
            background: none;
            cursor: pointer;
            font-size: 1.1rem;
            color: inherit;
        }
        .file-list { max-height: 300px; overflow-y: auto; }
        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 0.6rem; text-align: left; border-bottom: 1px solid #eee; }
        tbody tr:nth-child(odd) { background: #fafafa; }
        .action { color: #0d6efd; text-decoration: none; margin-right: 0.8rem; }
        .action.danger { color: #dc3545; }
        .action:hover { text-decoration: underline; }
        .empty { text-align: center; color: #7f8c8d; }
        "#
    ))
}

fn banner_html(flash: &Flash) -> String {
    // The message is stored pre-escaped by its producer; render it as-is.
    format!(
        r#"<div class="alert alert-{}" role="alert">
            <span>{}</span>
            <button class="close" onclick="this.parentElement.remove()">&times;</button>
        </div>"#,
        flash.status.as_str(),
        flash.message
    )
}

fn file_row(file: &StoredFile) -> String {
    let link = percent_encode(file.unique_name.as_bytes(), NON_ALPHANUMERIC);
    format!(
        r#"<tr>
            <td>{name}</td>
            <td>{kind}</td>
            <td>{size:.2}</td>
            <td>
                <a class="action" href="?download={link}">Download</a>
                <a class="action danger" href="?delete={link}" onclick="return confirm('Are you sure you want to delete this file?');">Delete</a>
            </td>
        </tr>"#,
        name = html_escape::encode_text(&file.original_name),
        kind = html_escape::encode_text(&file.kind),
        size = file.size_kb,
        link = link
    )
}
