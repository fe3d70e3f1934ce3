//! Render-proxy abstraction.
//!
//! The client never draws anything itself. It drives a [`Renderer`], which
//! owns one visual proxy per known player. A game engine integration
//! implements the trait over its scene graph; [`HeadlessRenderer`] keeps the
//! proxies in memory and is what the client binary and the tests use.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use cubesync_protocol::{Color, Vec3};

/// Creates, moves, recolors and destroys player proxies.
///
/// The client reads its own report back from its proxy via
/// [`position`](Renderer::position) and [`color`](Renderer::color), so
/// whatever moves the proxy (input, animation) is what gets reported.
pub trait Renderer {
    /// Opaque proxy handle.
    type Handle: Copy + Eq + Hash + fmt::Debug;

    /// Creates a proxy at the origin with the default color.
    fn create(&mut self) -> Self::Handle;

    fn set_position(&mut self, handle: Self::Handle, position: Vec3);

    fn set_color(&mut self, handle: Self::Handle, color: Color);

    /// Destroys a proxy. Unknown handles are ignored.
    fn destroy(&mut self, handle: Self::Handle);

    /// Current position, or `None` for an unknown handle.
    fn position(&self, handle: Self::Handle) -> Option<Vec3>;

    /// Current color, or `None` for an unknown handle.
    fn color(&self, handle: Self::Handle) -> Option<Color>;
}

/// Handle to a [`HeadlessRenderer`] proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyHandle(u64);

impl fmt::Display for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Proxy {
    position: Vec3,
    color: Color,
}

/// A [`Renderer`] that only remembers where each proxy is and what color it
/// has.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    next_handle: u64,
    proxies: HashMap<ProxyHandle, Proxy>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live proxies.
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn contains(&self, handle: ProxyHandle) -> bool {
        self.proxies.contains_key(&handle)
    }
}

impl Renderer for HeadlessRenderer {
    type Handle = ProxyHandle;

    fn create(&mut self) -> ProxyHandle {
        self.next_handle += 1;
        let handle = ProxyHandle(self.next_handle);
        self.proxies.insert(handle, Proxy::default());
        tracing::trace!(%handle, "proxy created");
        handle
    }

    fn set_position(&mut self, handle: ProxyHandle, position: Vec3) {
        if let Some(proxy) = self.proxies.get_mut(&handle) {
            proxy.position = position;
        }
    }

    fn set_color(&mut self, handle: ProxyHandle, color: Color) {
        if let Some(proxy) = self.proxies.get_mut(&handle) {
            proxy.color = color;
        }
    }

    fn destroy(&mut self, handle: ProxyHandle) {
        if self.proxies.remove(&handle).is_some() {
            tracing::trace!(%handle, "proxy destroyed");
        }
    }

    fn position(&self, handle: ProxyHandle) -> Option<Vec3> {
        self.proxies.get(&handle).map(|p| p.position)
    }

    fn color(&self, handle: ProxyHandle) -> Option<Color> {
        self.proxies.get(&handle).map(|p| p.color)
    }
}
