//! Win32 desktop backend: window enumeration via `EnumWindows` and pixel
//! capture via the Windows Graphics Capture API.

use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use std::ffi::{c_void, OsString};
use std::os::windows::ffi::OsStringExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use windows::core::Interface;
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{Direct3D11CaptureFramePool, GraphicsCaptureItem};
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT, TRUE};
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAP_READ, D3D11_SDK_VERSION,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Gdi::{ClientToScreen, MonitorFromPoint, MONITOR_DEFAULTTOPRIMARY};
use windows::Win32::System::WinRT::Direct3D11::{
    CreateDirect3D11DeviceFromDXGIDevice, IDirect3DDxgiInterfaceAccess,
};
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;
use windows::Win32::UI::Input::KeyboardAndMouse::IsWindowEnabled;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetSystemMetrics, GetWindowRect, GetWindowTextLengthW,
    GetWindowTextW, GetWindowThreadProcessId, IsWindow, IsWindowVisible, SM_CXSCREEN, SM_CYSCREEN,
};

use super::process::list_processes;
use super::{Desktop, ProcessInfo, Rect, WindowHandle, WindowId, WindowInfo};

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Initializes the WinRT apartment for the calling thread.
pub fn init() -> Result<()> {
    unsafe {
        windows::Win32::System::WinRT::RoInitialize(
            windows::Win32::System::WinRT::RO_INIT_MULTITHREADED,
        )?
    };
    Ok(())
}

#[derive(Default)]
pub struct Win32Desktop;

impl Win32Desktop {
    pub fn new() -> Self {
        Self
    }
}

impl Desktop for Win32Desktop {
    fn processes(&self) -> Vec<ProcessInfo> {
        list_processes()
    }

    fn windows(&self) -> Result<Vec<WindowInfo>> {
        unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
            unsafe {
                let windows = &mut *(lparam.0 as *mut Vec<WindowInfo>);

                if !IsWindowVisible(hwnd).as_bool() {
                    return TRUE;
                }

                let mut process_id: u32 = 0;
                GetWindowThreadProcessId(hwnd, Some(&mut process_id));

                let mut rect = RECT::default();
                if GetWindowRect(hwnd, &mut rect).is_err() {
                    return TRUE;
                }

                windows.push(WindowInfo {
                    id: WindowId(hwnd.0 as isize),
                    title: window_title(hwnd),
                    process_id,
                    rect: Rect::from_edges(rect.left, rect.top, rect.right, rect.bottom),
                    enabled: IsWindowEnabled(hwnd).as_bool(),
                });
                TRUE
            }
        }

        let mut windows: Vec<WindowInfo> = Vec::new();
        unsafe {
            EnumWindows(Some(enum_callback), LPARAM(&mut windows as *mut _ as isize))
                .context("EnumWindows failed")?;
        }
        Ok(windows)
    }

    fn capture_window(&self, window: &WindowHandle) -> Result<RgbaImage> {
        let hwnd = HWND(window.id.0 as *mut c_void);
        if !unsafe { IsWindow(hwnd) }.as_bool() {
            return Err(anyhow!("Window \"{}\" no longer exists", window.title));
        }

        let (client_rect, client_offset) = get_client_area_info(hwnd)?;
        let crop = Crop {
            x: client_offset.x.max(0) as u32,
            y: client_offset.y.max(0) as u32,
            width: (client_rect.right - client_rect.left).max(0) as u32,
            height: (client_rect.bottom - client_rect.top).max(0) as u32,
        };
        debug!(
            "Client area: {}x{} at offset ({}, {})",
            crop.width, crop.height, crop.x, crop.y
        );

        let interop = capture_item_interop()?;
        let item: GraphicsCaptureItem = unsafe {
            interop
                .CreateForWindow(hwnd)
                .context("Failed to create capture item for window")?
        };
        capture_item(&item, Some(crop))
    }

    fn capture_screen(&self) -> Result<RgbaImage> {
        let monitor = unsafe { MonitorFromPoint(POINT { x: 0, y: 0 }, MONITOR_DEFAULTTOPRIMARY) };
        let interop = capture_item_interop()?;
        let item: GraphicsCaptureItem = unsafe {
            interop
                .CreateForMonitor(monitor)
                .context("Failed to create capture item for monitor")?
        };
        capture_item(&item, None)
    }

    fn screen_size(&self) -> Option<(u32, u32)> {
        let (width, height) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if width > 0 && height > 0 {
            Some((width as u32, height as u32))
        } else {
            None
        }
    }
}

fn window_title(hwnd: HWND) -> String {
    unsafe {
        let title_len = GetWindowTextLengthW(hwnd);
        if title_len <= 0 {
            return String::new();
        }
        let mut title_buf: Vec<u16> = vec![0; (title_len + 1) as usize];
        let copied = GetWindowTextW(hwnd, &mut title_buf).max(0) as usize;
        OsString::from_wide(&title_buf[..copied])
            .to_string_lossy()
            .to_string()
    }
}

/// Gets the client area rectangle and its offset relative to the window
/// origin. Window captures include borders and the title bar, so the offset
/// is where the crop starts.
fn get_client_area_info(hwnd: HWND) -> Result<(RECT, POINT)> {
    let mut client_rect = RECT::default();
    unsafe { GetClientRect(hwnd, &mut client_rect)? };

    let mut client_origin = POINT { x: 0, y: 0 };
    unsafe {
        if !ClientToScreen(hwnd, &mut client_origin).as_bool() {
            return Err(anyhow!("ClientToScreen failed"));
        }
    }

    let mut window_rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut window_rect)? };

    let offset = POINT {
        x: client_origin.x - window_rect.left,
        y: client_origin.y - window_rect.top,
    };

    Ok((client_rect, offset))
}

#[derive(Debug, Clone, Copy)]
struct Crop {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

fn capture_item_interop() -> Result<IGraphicsCaptureItemInterop> {
    let class_name = windows::core::h!("Windows.Graphics.Capture.GraphicsCaptureItem");
    unsafe {
        windows::Win32::System::WinRT::RoGetActivationFactory(class_name)
            .context("Failed to get IGraphicsCaptureItemInterop")
    }
}

/// Grabs one frame of `item` and converts it to RGBA, optionally cropped.
fn capture_item(item: &GraphicsCaptureItem, crop: Option<Crop>) -> Result<RgbaImage> {
    let (device, context) = create_d3d11_device()?;
    let d3d_device = create_direct3d_device(&device)?;
    let size = item.Size()?;

    let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
        &d3d_device,
        DirectXPixelFormat::B8G8R8A8UIntNormalized,
        1,
        size,
    )?;
    let session = frame_pool.CreateCaptureSession(item)?;

    let frame_arrived = Arc::new(AtomicBool::new(false));
    let frame_arrived_clone = frame_arrived.clone();
    frame_pool.FrameArrived(&TypedEventHandler::new(
        move |_pool: &Option<Direct3D11CaptureFramePool>, _| {
            frame_arrived_clone.store(true, Ordering::SeqCst);
            Ok(())
        },
    ))?;

    session.StartCapture()?;

    let start = Instant::now();
    while !frame_arrived.load(Ordering::SeqCst) {
        if start.elapsed() > FRAME_TIMEOUT {
            let _ = session.Close();
            let _ = frame_pool.Close();
            return Err(anyhow!("Timeout waiting for frame"));
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let frame = frame_pool.TryGetNextFrame()?;
    let surface = frame.Surface()?;
    let access: IDirect3DDxgiInterfaceAccess = surface.cast()?;
    let texture: ID3D11Texture2D = unsafe { access.GetInterface()? };

    let mut desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { texture.GetDesc(&mut desc) };

    let staging_desc = D3D11_TEXTURE2D_DESC {
        Width: desc.Width,
        Height: desc.Height,
        MipLevels: 1,
        ArraySize: 1,
        Format: desc.Format,
        SampleDesc: desc.SampleDesc,
        Usage: D3D11_USAGE_STAGING,
        BindFlags: Default::default(),
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: Default::default(),
    };

    let staging_texture = unsafe {
        let mut staging: Option<ID3D11Texture2D> = None;
        device.CreateTexture2D(&staging_desc, None, Some(&mut staging))?;
        staging.ok_or_else(|| anyhow!("Failed to create staging texture"))?
    };
    let staging_resource = staging_texture.cast::<ID3D11Resource>()?;

    unsafe {
        context.CopyResource(&staging_resource, &texture.cast::<ID3D11Resource>()?);
    }

    let mapped = unsafe {
        let mut mapped = Default::default();
        context.Map(&staging_resource, 0, D3D11_MAP_READ, 0, Some(&mut mapped))?;
        mapped
    };

    let crop = crop.unwrap_or(Crop {
        x: 0,
        y: 0,
        width: desc.Width,
        height: desc.Height,
    });
    let width = crop.width.min(desc.Width.saturating_sub(crop.x));
    let height = crop.height.min(desc.Height.saturating_sub(crop.y));

    let src_data = unsafe {
        std::slice::from_raw_parts(
            mapped.pData as *const u8,
            (mapped.RowPitch * desc.Height) as usize,
        )
    };
    let row_pitch = mapped.RowPitch as usize;

    let mut img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(width, height);
    for y in 0..height {
        let src_y = (crop.y + y) as usize;
        for x in 0..width {
            let offset = src_y * row_pitch + (crop.x + x) as usize * 4;
            // BGRA -> RGBA
            img.put_pixel(
                x,
                y,
                Rgba([
                    src_data[offset + 2],
                    src_data[offset + 1],
                    src_data[offset],
                    src_data[offset + 3],
                ]),
            );
        }
    }

    unsafe {
        context.Unmap(&staging_resource, 0);
    }

    session.Close()?;
    frame_pool.Close()?;

    debug!("Captured {}x{} frame", img.width(), img.height());
    Ok(img)
}

fn create_d3d11_device() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;

    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )?;
    }

    Ok((
        device.ok_or_else(|| anyhow!("Failed to create D3D11 device"))?,
        context.ok_or_else(|| anyhow!("Failed to create D3D11 context"))?,
    ))
}

/// WinRT wrapper around the D3D11 device, required by the capture API.
fn create_direct3d_device(
    device: &ID3D11Device,
) -> Result<windows::Graphics::DirectX::Direct3D11::IDirect3DDevice> {
    let dxgi_device: windows::Win32::Graphics::Dxgi::IDXGIDevice = device.cast()?;
    let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device)? };
    inspectable
        .cast()
        .context("Failed to cast to IDirect3DDevice")
}
