//! `WasmIsolator`: the `wasmtime`-backed [`ContractRuntime`].
//!
//! Compiled modules are cached by bytecode hash so re-invoking the same
//! contract within a block (or across blocks) never recompiles. Every
//! instantiation is fresh: linear memory, globals and table state never
//! survive between calls, matching the evaluator's fresh-frame-per-
//! occurrence policy upstream.
//!
//! Two sandboxing mechanisms are layered:
//! - **Fuel** (`wasmtime::Store::set_fuel`) stands in for gas. The
//!   evaluator converts its remaining `GasUnits` to a fuel budget at
//!   instantiation time and never tops it up mid-call.
//! - **Epoch interruption** bounds wall-clock time independent of fuel,
//!   so a guest spinning in a fuel-free trap (e.g. an infinite loop inside
//!   a single large fuel-metered block before the next check) still gets
//!   cut off. A background thread increments the shared engine epoch on
//!   a fixed tick; the store's deadline is set in epoch ticks at
//!   instantiation.
//!
//! Host imports are deliberately minimal: `env.abort` and `env.log`. No
//! host function gives a contract access to wall-clock time, randomness
//! or any other non-deterministic source — determinism is enforced by
//! restricting the import set, not by rejecting float instructions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use cx_types::value_objects::{Address, Bytes, Hash};
use wasmtime::{Caller, Config, Engine, Linker, Memory, Module, OptLevel, Store, TypedFunc};

use crate::errors::WasmError;
use crate::runtime::{ContractRuntime, GuestContract};

/// How often the epoch ticker advances the shared engine epoch.
const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Background thread incrementing a `wasmtime::Engine`'s epoch on a fixed
/// interval, giving every store an independent wall-clock deadline
/// measured in ticks.
struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    fn start(engine: Engine) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = std::thread::Builder::new()
            .name("cx-wasm-epoch-ticker".into())
            .spawn(move || {
                while !stop_clone.load(Ordering::Relaxed) {
                    std::thread::sleep(EPOCH_TICK);
                    engine.increment_epoch();
                }
            })
            .expect("spawn epoch ticker thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// The wasmtime-backed contract runtime.
///
/// One `WasmIsolator` is shared across an entire process (or at least a
/// block's worth of execution); it owns the compiled-module cache and the
/// epoch ticker.
pub struct WasmIsolator {
    engine: Engine,
    modules: RwLock<HashMap<Hash, Module>>,
    _ticker: EpochTicker,
}

impl WasmIsolator {
    /// Build a new isolator and start its epoch ticker.
    pub fn new() -> Result<Self, WasmError> {
        let mut config = Config::new();
        config
            .consume_fuel(true)
            .epoch_interruption(true)
            .wasm_reference_types(false)
            .wasm_multi_value(false)
            .wasm_bulk_memory(true)
            .wasm_simd(false)
            .cranelift_opt_level(OptLevel::Speed);

        let engine =
            Engine::new(&config).map_err(|e| WasmError::InstantiationError(e.to_string()))?;
        let ticker = EpochTicker::start(engine.clone());

        Ok(Self {
            engine,
            modules: RwLock::new(HashMap::new()),
            _ticker: ticker,
        })
    }

    fn compiled_module(&self, bytecode: &Bytes) -> Result<Module, WasmError> {
        let key = Hash::digest(bytecode.as_slice());

        if let Some(m) = self.modules.read().unwrap().get(&key) {
            return Ok(m.clone());
        }

        let module = Module::new(&self.engine, bytecode.as_slice())
            .map_err(|e| WasmError::CompileError(e.to_string()))?;
        self.modules.write().unwrap().insert(key, module.clone());
        Ok(module)
    }
}

impl Default for WasmIsolator {
    fn default() -> Self {
        Self::new().expect("wasmtime engine construction")
    }
}

impl ContractRuntime for WasmIsolator {
    fn instantiate(
        &self,
        contract: Address,
        bytecode: &Bytes,
        fuel: u64,
        epoch_ticks: u64,
    ) -> Result<Box<dyn GuestContract>, WasmError> {
        let module = self.compiled_module(bytecode)?;

        let mut store = Store::new(&self.engine, HostState { contract });
        store
            .set_fuel(fuel)
            .map_err(|e| WasmError::InstantiationError(e.to_string()))?;
        store.set_epoch_deadline(epoch_ticks.max(1));

        let mut linker: Linker<HostState> = Linker::new(&self.engine);
        linker
            .func_wrap("env", "abort", host_abort)
            .map_err(|e| WasmError::InstantiationError(e.to_string()))?;
        linker
            .func_wrap("env", "log", host_log)
            .map_err(|e| WasmError::InstantiationError(e.to_string()))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(classify_trap)?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| WasmError::MissingExport("memory".into()))?;

        Ok(Box::new(ContractInstance {
            store,
            memory,
            instance,
            initial_fuel: fuel,
        }))
    }
}

/// Per-store host state. Only the executing contract's address is needed,
/// purely to tag `env.log`/`env.abort` diagnostics.
struct HostState {
    contract: Address,
}

fn host_abort(caller: Caller<'_, HostState>, _ptr: i32, _len: i32, line: i32, col: i32) {
    let contract = caller.data().contract;
    tracing::warn!(%contract, line, col, "guest called env.abort");
}

fn host_log(caller: Caller<'_, HostState>, ptr: i32, len: i32) {
    let contract = caller.data().contract;
    if let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory()) {
        let mut buf = vec![0u8; len.max(0) as usize];
        if memory.read(&caller, ptr as usize, &mut buf).is_ok() {
            let text = String::from_utf8_lossy(&buf);
            tracing::info!(%contract, "{}", text);
            return;
        }
    }
    tracing::info!(%contract, "guest log (unreadable buffer)");
}

/// Classify an instantiation/call error as a timeout, a trap, or a
/// generic instantiation failure.
fn classify_trap(err: anyhow::Error) -> WasmError {
    if let Some(trap) = err.downcast_ref::<wasmtime::Trap>() {
        if matches!(
            trap,
            wasmtime::Trap::Interrupt | wasmtime::Trap::OutOfFuel
        ) {
            return if matches!(trap, wasmtime::Trap::OutOfFuel) {
                WasmError::OutOfFuel
            } else {
                WasmError::Timeout
            };
        }
        return WasmError::Trap(trap.to_string());
    }
    WasmError::InstantiationError(err.to_string())
}

/// One invocation-scoped guest instance.
struct ContractInstance {
    store: Store<HostState>,
    instance: wasmtime::Instance,
    memory: Memory,
    initial_fuel: u64,
}

impl ContractInstance {
    fn typed<Params, Results>(
        &mut self,
        name: &str,
    ) -> Result<TypedFunc<Params, Results>, WasmError>
    where
        Params: wasmtime::WasmParams,
        Results: wasmtime::WasmResults,
    {
        self.instance
            .get_typed_func::<Params, Results>(&mut self.store, name)
            .map_err(|_| WasmError::MissingExport(name.into()))
    }

    fn call0(&mut self, name: &str) -> Result<(), WasmError> {
        let f: TypedFunc<(), ()> = self.typed(name)?;
        f.call(&mut self.store, ()).map_err(classify_trap)
    }

    /// Calls an export returning a guest pointer to a length-prefixed
    /// (`u32` LE length, then payload) buffer, and reads it back out of
    /// linear memory.
    fn call_returning_buffer(&mut self, name: &str, args: &[i32]) -> Result<Vec<u8>, WasmError> {
        let ptr = match args.len() {
            0 => {
                let f: TypedFunc<(), i32> = self.typed(name)?;
                f.call(&mut self.store, ()).map_err(classify_trap)?
            }
            1 => {
                let f: TypedFunc<i32, i32> = self.typed(name)?;
                f.call(&mut self.store, args[0]).map_err(classify_trap)?
            }
            2 => {
                let f: TypedFunc<(i32, i32), i32> = self.typed(name)?;
                f.call(&mut self.store, (args[0], args[1]))
                    .map_err(classify_trap)?
            }
            3 => {
                let f: TypedFunc<(i32, i32, i32), i32> = self.typed(name)?;
                f.call(&mut self.store, (args[0], args[1], args[2]))
                    .map_err(classify_trap)?
            }
            _ => return Err(WasmError::MissingExport(name.into())),
        };
        self.read_length_prefixed(ptr)
    }

    fn write_buffer(&mut self, data: &[u8]) -> Result<i32, WasmError> {
        let alloc: TypedFunc<i32, i32> = self.typed("__alloc")?;
        let total = 4 + data.len();
        let ptr = alloc
            .call(&mut self.store, total as i32)
            .map_err(classify_trap)?;
        if ptr < 0 {
            return Err(WasmError::InvalidBuffer("__alloc returned negative pointer".into()));
        }
        let mut payload = Vec::with_capacity(total);
        payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
        payload.extend_from_slice(data);
        self.memory
            .write(&mut self.store, ptr as usize, &payload)
            .map_err(|e| WasmError::InvalidBuffer(e.to_string()))?;
        Ok(ptr)
    }

    fn read_length_prefixed(&mut self, ptr: i32) -> Result<Vec<u8>, WasmError> {
        if ptr < 0 {
            return Err(WasmError::InvalidBuffer("negative guest pointer".into()));
        }
        let ptr = ptr as usize;
        let mut len_bytes = [0u8; 4];
        self.memory
            .read(&self.store, ptr, &mut len_bytes)
            .map_err(|e| WasmError::InvalidBuffer(e.to_string()))?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        let mem_len = self.memory.data_size(&self.store);
        if ptr + 4 + len > mem_len {
            return Err(WasmError::InvalidBuffer(
                "length prefix points past end of linear memory".into(),
            ));
        }

        let mut buf = vec![0u8; len];
        self.memory
            .read(&self.store, ptr + 4, &mut buf)
            .map_err(|e| WasmError::InvalidBuffer(e.to_string()))?;
        Ok(buf)
    }
}

impl GuestContract for ContractInstance {
    fn init(&mut self, deployer: Address, self_address: Address) -> Result<(), WasmError> {
        let mut payload = Vec::with_capacity(64);
        payload.extend_from_slice(deployer.as_bytes());
        payload.extend_from_slice(self_address.as_bytes());
        let ptr = self.write_buffer(&payload)?;
        let f: TypedFunc<i32, ()> = self.typed("init")?;
        f.call(&mut self.store, ptr).map_err(classify_trap)
    }

    fn read_method(
        &mut self,
        selector: u32,
        calldata: &[u8],
        caller: Address,
    ) -> Result<Vec<u8>, WasmError> {
        let mut payload = Vec::with_capacity(4 + calldata.len() + 32);
        payload.extend_from_slice(&selector.to_be_bytes());
        payload.extend_from_slice(calldata);
        payload.extend_from_slice(caller.as_bytes());
        let ptr = self.write_buffer(&payload)?;
        self.call_returning_buffer("readMethod", &[ptr])
    }

    fn read_view(&mut self, selector: u32) -> Result<Vec<u8>, WasmError> {
        self.call_returning_buffer("readView", &[selector as i32])
    }

    fn get_method_abi(&mut self) -> Result<Vec<u8>, WasmError> {
        self.call_returning_buffer("getMethodABI", &[])
    }

    fn get_view_abi(&mut self) -> Result<Vec<u8>, WasmError> {
        self.call_returning_buffer("getViewABI", &[])
    }

    fn get_events(&mut self) -> Result<Vec<u8>, WasmError> {
        self.call_returning_buffer("getEvents", &[])
    }

    fn get_write_methods(&mut self) -> Result<Vec<u8>, WasmError> {
        self.call_returning_buffer("getWriteMethods", &[])
    }

    fn set_environment(&mut self, env_bytes: &[u8]) -> Result<(), WasmError> {
        let ptr = self.write_buffer(env_bytes)?;
        let f: TypedFunc<i32, ()> = self.typed("setEnvironment")?;
        f.call(&mut self.store, ptr).map_err(classify_trap)
    }

    fn set_max_gas(&mut self, max: u64, used: u64) -> Result<(), WasmError> {
        let f: TypedFunc<(i64, i64), ()> = self.typed("setMaxGas")?;
        f.call(&mut self.store, (max as i64, used as i64))
            .map_err(classify_trap)
    }

    fn load_storage(&mut self, snapshot: &[u8]) -> Result<(), WasmError> {
        let ptr = self.write_buffer(snapshot)?;
        let f: TypedFunc<i32, ()> = self.typed("loadStorage")?;
        f.call(&mut self.store, ptr).map_err(classify_trap)
    }

    fn get_modified_storage(&mut self) -> Result<Vec<u8>, WasmError> {
        self.call_returning_buffer("getModifiedStorage", &[])
    }

    fn get_calls(&mut self) -> Result<Vec<u8>, WasmError> {
        self.call_returning_buffer("getCalls", &[])
    }

    fn load_calls_response(&mut self, response: &[u8]) -> Result<(), WasmError> {
        let ptr = self.write_buffer(response)?;
        let f: TypedFunc<i32, ()> = self.typed("loadCallsResponse")?;
        f.call(&mut self.store, ptr).map_err(classify_trap)
    }

    fn purge_memory(&mut self) -> Result<(), WasmError> {
        self.call0("purgeMemory")
    }

    fn is_initialized(&mut self) -> Result<bool, WasmError> {
        let f: TypedFunc<(), i32> = self.typed("isInitialized")?;
        let r = f.call(&mut self.store, ()).map_err(classify_trap)?;
        Ok(r != 0)
    }

    fn fuel_consumed(&mut self) -> Result<u64, WasmError> {
        let remaining = self
            .store
            .get_fuel()
            .map_err(|e| WasmError::InstantiationError(e.to_string()))?;
        Ok(self.initial_fuel.saturating_sub(remaining))
    }
}
