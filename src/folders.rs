//! Folder enumeration
//!
//! Decides which folders a search pass covers. Without `all_folders` the
//! inbox is used directly and the server's folder list is never requested.

use crate::errors::AppResult;
use crate::imap::MailSession;
use crate::models::FolderHandle;
use crate::observer::RunObserver;

/// Folders to search, in server-reported order
///
/// With `all_folders`, non-selectable folders (`\Noselect` hierarchy nodes)
/// are dropped and reported through `observer`.
///
/// # Errors
///
/// - `FolderList` if the server-level LIST call fails
pub async fn list_folders<S: MailSession>(
    session: &mut S,
    all_folders: bool,
    observer: &dyn RunObserver,
) -> AppResult<Vec<FolderHandle>> {
    if !all_folders {
        return Ok(vec![FolderHandle::inbox()]);
    }

    let folders = session.list_folders().await?;
    let mut selectable = Vec::with_capacity(folders.len());
    for folder in folders {
        if folder.selectable {
            selectable.push(folder);
        } else {
            observer.folder_skipped(&folder.display_name, "folder is not selectable");
        }
    }
    Ok(selectable)
}

/// Build a handle from a raw LIST name, decoding modified UTF-7 for display
pub fn folder_handle(raw_name: &str, selectable: bool) -> FolderHandle {
    FolderHandle {
        name: raw_name.to_owned(),
        display_name: utf7_imap::decode_utf7_imap(raw_name.to_owned()),
        selectable,
    }
}
