use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Condvar, Mutex, OnceLock, Weak};
use std::thread;

use log::{debug, trace, warn};

use cohort_core::error::{panic_message, Error, Result};
use cohort_core::shape::{Extent, GridPoint, GridShape};

// VirtualDevice — Software emulation of a two-level hardware resource
//
// Models the device/queue abstraction the grid executor consumes: a registry
// of devices keyed by ordinal with a process-global *current* device, work
// queues ("streams") drained in order by one worker thread each, launches
// sized by a GridShape, completion callbacks, and full-queue synchronize.
//
// A launch executes its groups one after another (groups carry no ordering
// guarantee, so any order is legal); the lanes of one group run as concurrent
// OS threads sharing a barrier, exposed to kernels through
// `LaneCtx::sync_group`. Because lanes are real threads, the default limits
// cap a group at 64 lanes rather than a hardware-sized 1024.
//
// A panicking lane is caught at the lane boundary and recorded as the
// device's fault; it surfaces as `Error::DeviceFault` from the next
// host-side check (`synchronize`), never through a future's value channel.

/// Dimension limits a device reports for launches.
#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    /// Maximum outer (group-count) extent, dimension-wise.
    pub max_outer: Extent,
    /// Maximum inner (lanes-per-group) extent, dimension-wise.
    pub max_inner: Extent,
    /// Maximum total lanes in one group, across all inner dimensions.
    pub max_lanes_per_group: usize,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        DeviceLimits {
            max_outer: Extent::d3(65_535, 65_535, 65_535),
            max_inner: Extent::d3(64, 64, 8),
            max_lanes_per_group: 64,
        }
    }
}

/// Per-lane-function limits reported by a device query.
#[derive(Debug, Clone, Copy)]
pub struct FunctionAttributes {
    pub max_lanes_per_group: usize,
}

// Device registry and the global current device

fn registry() -> &'static Mutex<HashMap<usize, VirtualDevice>> {
    static REGISTRY: OnceLock<Mutex<HashMap<usize, VirtualDevice>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

static CURRENT_DEVICE: AtomicUsize = AtomicUsize::new(0);

/// Serializes every save/switch/query/restore sequence on the global
/// current device (see `GridExecutor::max_shape`).
pub(crate) static DEVICE_QUERY_LOCK: Mutex<()> = Mutex::new(());

/// The ordinal of the process-global current device.
pub fn current_device() -> usize {
    CURRENT_DEVICE.load(Ordering::SeqCst)
}

/// Switch the process-global current device.
pub fn set_current_device(ordinal: usize) -> Result<()> {
    if !registry()
        .lock()
        .expect("device registry lock poisoned")
        .contains_key(&ordinal)
    {
        return Err(Error::NoSuchDevice(ordinal));
    }
    trace!("current device set to {ordinal}");
    CURRENT_DEVICE.store(ordinal, Ordering::SeqCst);
    Ok(())
}

/// Look up a registered device by ordinal.
pub fn device(ordinal: usize) -> Result<VirtualDevice> {
    registry()
        .lock()
        .expect("device registry lock poisoned")
        .get(&ordinal)
        .cloned()
        .ok_or(Error::NoSuchDevice(ordinal))
}

// Stream — An ordered device work queue

type Job = Box<dyn FnOnce() + Send>;

struct StreamInner {
    jobs: mpsc::Sender<Job>,
    pending: Mutex<usize>,
    drained: Condvar,
}

/// A device work queue: jobs run in submission order on one worker thread.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    fn spawn(ordinal: usize) -> Stream {
        let (tx, rx) = mpsc::channel::<Job>();
        let inner = Arc::new(StreamInner {
            jobs: tx,
            pending: Mutex::new(0),
            drained: Condvar::new(),
        });
        // The worker holds only a weak handle: dropping the last Stream
        // closes the channel and lets the worker exit.
        let weak: Weak<StreamInner> = Arc::downgrade(&inner);
        thread::spawn(move || {
            trace!("stream worker for device {ordinal} started");
            for job in rx.iter() {
                job();
                if let Some(inner) = weak.upgrade() {
                    let mut pending = inner.pending.lock().expect("stream lock poisoned");
                    *pending -= 1;
                    if *pending == 0 {
                        inner.drained.notify_all();
                    }
                }
            }
            trace!("stream worker for device {ordinal} exited");
        });
        Stream { inner }
    }

    fn enqueue(&self, op: &'static str, job: Job) -> Result<()> {
        {
            let mut pending = self.inner.pending.lock().expect("stream lock poisoned");
            *pending += 1;
        }
        self.inner.jobs.send(job).map_err(|_| {
            let mut pending = self.inner.pending.lock().expect("stream lock poisoned");
            *pending -= 1;
            Error::Launch {
                op,
                code: 4,
                detail: "stream worker is gone".to_string(),
            }
        })
    }

    /// Enqueue a callback that runs once every previously submitted job has
    /// completed. Completion is delivered, never polled for.
    pub fn add_callback<C>(&self, callback: C) -> Result<()>
    where
        C: FnOnce() + Send + 'static,
    {
        self.enqueue("add_callback", Box::new(callback))
    }

    /// Block until the queue is fully drained.
    pub fn synchronize(&self) {
        let mut pending = self.inner.pending.lock().expect("stream lock poisoned");
        while *pending > 0 {
            pending = self
                .inner
                .drained
                .wait(pending)
                .expect("stream lock poisoned");
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = *self.inner.pending.lock().expect("stream lock poisoned");
        f.debug_struct("Stream").field("pending", &pending).finish()
    }
}

// LaneCtx — What the device hands each lane

/// Per-lane execution context: the lane's coordinates and its group barrier.
pub struct LaneCtx<'a> {
    point: GridPoint,
    shape: GridShape,
    barrier: &'a Barrier,
}

impl LaneCtx<'_> {
    /// This lane's (outer, inner) identity, from the device's coordinates.
    pub fn index(&self) -> GridPoint {
        self.point
    }

    /// The shape of the launch this lane belongs to.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Linear rank of this lane's group.
    pub fn outer_rank(&self) -> usize {
        self.shape.outer.linear(self.point.outer)
    }

    /// Linear rank of this lane within its group.
    pub fn inner_rank(&self) -> usize {
        self.shape.inner.linear(self.point.inner)
    }

    /// Barrier across the lanes of this group. Every lane of the group must
    /// reach the same sequence of `sync_group` calls.
    pub fn sync_group(&self) {
        self.barrier.wait();
    }
}

// VirtualDevice

struct DeviceInner {
    ordinal: usize,
    limits: DeviceLimits,
    stream: Stream,
    fault: Mutex<Option<String>>,
}

/// A registered virtual device. Cheap to clone; clones share identity.
#[derive(Clone)]
pub struct VirtualDevice {
    inner: Arc<DeviceInner>,
}

impl VirtualDevice {
    /// Open the device at `ordinal`, registering it with default limits if
    /// it does not exist yet.
    pub fn open(ordinal: usize) -> VirtualDevice {
        registry()
            .lock()
            .expect("device registry lock poisoned")
            .entry(ordinal)
            .or_insert_with(|| VirtualDevice::create(ordinal, DeviceLimits::default()))
            .clone()
    }

    /// Register the device at `ordinal` with explicit limits. Fails if the
    /// ordinal is already registered.
    pub fn open_with(ordinal: usize, limits: DeviceLimits) -> Result<VirtualDevice> {
        let mut registry = registry().lock().expect("device registry lock poisoned");
        if registry.contains_key(&ordinal) {
            return Err(Error::msg(format!(
                "device ordinal {ordinal} is already registered"
            )));
        }
        let device = VirtualDevice::create(ordinal, limits);
        registry.insert(ordinal, device.clone());
        Ok(device)
    }

    fn create(ordinal: usize, limits: DeviceLimits) -> VirtualDevice {
        debug!("registering virtual device {ordinal}");
        VirtualDevice {
            inner: Arc::new(DeviceInner {
                ordinal,
                limits,
                stream: Stream::spawn(ordinal),
                fault: Mutex::new(None),
            }),
        }
    }

    pub fn ordinal(&self) -> usize {
        self.inner.ordinal
    }

    pub fn limits(&self) -> DeviceLimits {
        self.inner.limits
    }

    /// The device's default work queue.
    pub fn default_stream(&self) -> &Stream {
        &self.inner.stream
    }

    /// Legal dimension limits for one lane function.
    pub fn function_attributes<F>(&self, _f: &F) -> FunctionAttributes {
        trace!(
            "device {}: querying attributes of {}",
            self.inner.ordinal,
            std::any::type_name::<F>()
        );
        FunctionAttributes {
            max_lanes_per_group: self.inner.limits.max_lanes_per_group,
        }
    }

    /// Enqueue one grid launch on `stream`. The launch is rejected here if
    /// `shape` exceeds the device limits; lane execution happens on the
    /// stream worker.
    pub fn launch<K>(&self, stream: &Stream, shape: GridShape, kernel: K) -> Result<()>
    where
        K: Fn(&LaneCtx) + Send + Sync + 'static,
    {
        let limits = &self.inner.limits;
        if !limits.max_outer.admits(shape.outer)
            || !limits.max_inner.admits(shape.inner)
            || shape.group_size() > limits.max_lanes_per_group
        {
            return Err(Error::Launch {
                op: "launch",
                code: 9,
                detail: format!(
                    "shape {shape} exceeds device {} limits",
                    self.inner.ordinal
                ),
            });
        }
        debug!("device {}: launching {shape}", self.inner.ordinal);
        let device = self.clone();
        stream.enqueue("launch", Box::new(move || device.run_grid(shape, kernel)))
    }

    /// Block until all outstanding work on the device has drained, then
    /// report any fault a lane raised since the last check.
    pub fn synchronize(&self) -> Result<()> {
        self.inner.stream.synchronize();
        self.take_fault()
    }

    /// Report and clear the device's recorded fault, if any.
    pub fn take_fault(&self) -> Result<()> {
        match self
            .inner
            .fault
            .lock()
            .expect("device fault lock poisoned")
            .take()
        {
            Some(message) => Err(Error::DeviceFault(message)),
            None => Ok(()),
        }
    }

    fn record_fault(&self, message: String) {
        let mut fault = self.inner.fault.lock().expect("device fault lock poisoned");
        if fault.is_none() {
            warn!("device {}: lane fault: {message}", self.inner.ordinal);
            *fault = Some(message);
        }
    }

    /// Execute one launch: groups in sequence, the lanes of each group as
    /// concurrent scoped threads sharing one barrier.
    fn run_grid<K>(&self, shape: GridShape, kernel: K)
    where
        K: Fn(&LaneCtx) + Send + Sync,
    {
        let group_size = shape.group_size();
        for outer in shape.outer.points() {
            let barrier = Barrier::new(group_size);
            thread::scope(|scope| {
                for inner in shape.inner.points() {
                    let kernel = &kernel;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        let ctx = LaneCtx {
                            point: GridPoint { outer, inner },
                            shape,
                            barrier,
                        };
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| kernel(&ctx))) {
                            self.record_fault(panic_message(payload.as_ref()));
                        }
                    });
                }
            });
        }
    }
}

impl std::fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("ordinal", &self.inner.ordinal)
            .field("limits", &self.inner.limits)
            .finish()
    }
}
