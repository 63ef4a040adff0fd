use std::ffi::c_void;

use tracing::trace;
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, TRUE};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_FORMAT,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
};

use crate::window::WindowInfo;

/// Enumerate visible, uncloaked top-level windows.
pub fn enumerate_windows() -> Vec<WindowInfo> {
    let mut results: Vec<WindowInfo> = Vec::new();

    unsafe {
        let _ = EnumWindows(
            Some(enum_window_callback),
            LPARAM(&mut results as *mut Vec<WindowInfo> as isize),
        );
    }

    results
}

unsafe extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let results = &mut *(lparam.0 as *mut Vec<WindowInfo>);

    if !is_visible_on_screen(hwnd) {
        return TRUE;
    }

    // A window whose process exited or denies access is skipped, not fatal.
    let Some(image_path) = process_image_path(hwnd) else {
        return TRUE;
    };

    let mut title = [0u16; 512];
    let len = GetWindowTextW(hwnd, &mut title);
    if len <= 0 {
        return TRUE;
    }
    let title = String::from_utf16_lossy(&title[..len as usize]);

    trace!(image = %image_path, title = %title, "Visible window");
    results.push(WindowInfo::new(hwnd.0 as isize, image_path, title));

    TRUE
}

/// Visible and not cloaked (e.g. parked on another virtual desktop).
unsafe fn is_visible_on_screen(hwnd: HWND) -> bool {
    if !IsWindowVisible(hwnd).as_bool() {
        return false;
    }
    let mut cloaked: u32 = 0;
    let result = DwmGetWindowAttribute(
        hwnd,
        DWMWA_CLOAKED,
        &mut cloaked as *mut u32 as *mut c_void,
        std::mem::size_of::<u32>() as u32,
    );
    result.is_err() || cloaked == 0
}

unsafe fn process_image_path(hwnd: HWND) -> Option<String> {
    let mut pid: u32 = 0;
    GetWindowThreadProcessId(hwnd, Some(&mut pid));
    if pid == 0 {
        return None;
    }

    let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
    let mut buffer = vec![0u16; 1024];
    let mut size = buffer.len() as u32;
    let ok = QueryFullProcessImageNameW(
        handle,
        PROCESS_NAME_FORMAT(0),
        PWSTR(buffer.as_mut_ptr()),
        &mut size,
    )
    .is_ok();
    let _ = CloseHandle(handle);

    ok.then(|| String::from_utf16_lossy(&buffer[..size as usize]))
}
