use crate::codegen::codegen_error::CodegenError;
use crate::codegen::instr::{Arg, Mnemonic, Reg};
use crate::codegen::writer::Writer;
use crate::lang::operand::{Storage, Variable};

pub const MIN_REGISTERS: usize = 2;
pub const DEFAULT_REGISTERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterState {
    /// Holds nothing of value.
    Empty,
    /// Holds a copy of a variable or constant that may be reused or evicted.
    Free,
    /// Holds a live intermediate result, or an operand of the current instruction.
    Used,
}

impl RegisterState {
    fn index(self) -> usize {
        match self {
            RegisterState::Empty => 0,
            RegisterState::Free => 1,
            RegisterState::Used => 2,
        }
    }
}

/// The value a register currently mirrors.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Variable(Variable),
    Constant(i64),
    Intermediate(u32),
}

#[derive(Debug)]
struct Register {
    reg: Reg,
    state: RegisterState,
    binding: Option<Binding>,
    last_use: u64,
    /// Variable value newer than its memory location.
    written: bool,
}

/// A word pushed to free a register. `value` is `None` once it was read back
/// from below the top of the stack and only waits to be dropped.
#[derive(Debug)]
struct SpillSlot {
    value: Option<u32>,
    position: usize,
}

/// General purpose register pool with LRU eviction.
///
/// Variables are cached with write-back: an assignment only marks the
/// register, and the store happens on eviction or at an explicit flush.
/// Intermediate results that lose their register are pushed and later
/// recovered with `POP` (top of stack) or `LOAD [esp+k]`.
#[derive(Debug)]
pub struct RegisterFile {
    registers: Vec<Register>,
    counts: [usize; 3],
    clock: u64,
    /// Registers read by the instruction being assembled.
    pinned: Vec<usize>,
    /// Words pushed since the frame was set up.
    stack_depth: usize,
    spills: Vec<SpillSlot>,
    /// Stack depth at the first argument push of each pending call.
    call_starts: Vec<usize>,
}

impl RegisterFile {
    pub fn new(size: usize) -> Result<Self, CodegenError> {
        if size < MIN_REGISTERS {
            return Err(CodegenError::PoolTooSmall {
                requested: size,
                minimum: MIN_REGISTERS,
            });
        }
        let registers = (1..=size)
            .map(|n| Register {
                reg: Reg::General(n.min(u8::MAX as usize) as u8),
                state: RegisterState::Empty,
                binding: None,
                last_use: 0,
                written: false,
            })
            .collect();
        Ok(Self {
            registers,
            counts: [size, 0, 0],
            clock: 0,
            pinned: Vec::new(),
            stack_depth: 0,
            spills: Vec::new(),
            call_starts: Vec::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.registers.len()
    }

    /// Number of registers in `state`.
    pub fn count(&self, state: RegisterState) -> usize {
        self.counts[state.index()]
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    // -----------------------------------------------------------------
    // Operands and results
    // -----------------------------------------------------------------

    /// Makes `binding` available in a register for the current instruction.
    pub fn load_operand(&mut self, binding: Binding, out: &mut Writer) -> Result<Reg, CodegenError> {
        if let Some(i) = self.find(&binding) {
            self.touch(i);
            self.set_state(i, RegisterState::Used);
            self.pin(i);
            return Ok(self.registers[i].reg);
        }

        if let Binding::Intermediate(n) = binding {
            return self.fill(n, out);
        }

        let i = self.take_register(out)?;
        let reg = self.registers[i].reg;
        match &binding {
            Binding::Constant(k) => out.emit(Mnemonic::Mov, vec![Arg::Reg(reg), Arg::Imm(*k)]),
            Binding::Variable(v) if v.is_array() => match &v.storage {
                Storage::Frame(offset) => out.emit(
                    Mnemonic::Add,
                    vec![Arg::Reg(reg), Arg::Reg(Reg::Ebp), Arg::Imm(*offset)],
                ),
                Storage::Global(_) => out.emit(Mnemonic::Load, vec![Arg::Reg(reg), location(v)]),
            },
            Binding::Variable(v) => out.emit(Mnemonic::Load, vec![Arg::Reg(reg), location(v)]),
            Binding::Intermediate(_) => {}
        }
        self.bind(i, binding, RegisterState::Used);
        self.pin(i);
        Ok(reg)
    }

    /// Reserves a register that the next instruction writes `variable` into.
    /// Nothing is loaded; the register is marked as written.
    pub fn bind_for_write(&mut self, variable: &Variable, out: &mut Writer) -> Result<Reg, CodegenError> {
        let binding = Binding::Variable(variable.clone());
        let i = match self.find(&binding) {
            Some(i) => i,
            None => {
                let i = self.take_register(out)?;
                self.bind(i, binding, RegisterState::Used);
                i
            }
        };
        self.touch(i);
        self.set_state(i, RegisterState::Used);
        self.registers[i].written = true;
        self.pin(i);
        Ok(self.registers[i].reg)
    }

    /// Releases the operands of the finished instruction and picks the
    /// register for its result `%n`.
    pub fn bind_result(&mut self, n: u32, out: &mut Writer) -> Result<Reg, CodegenError> {
        self.release_operands();
        let i = self.take_register(out)?;
        self.bind(i, Binding::Intermediate(n), RegisterState::Used);
        Ok(self.registers[i].reg)
    }

    /// Consumed intermediates die; cached variables and constants stay as
    /// reusable copies.
    pub fn release_operands(&mut self) {
        let pinned = std::mem::take(&mut self.pinned);
        for i in pinned {
            match self.registers[i].binding {
                Some(Binding::Intermediate(_)) => self.clear(i),
                Some(_) => self.set_state(i, RegisterState::Free),
                None => {}
            }
        }
    }

    /// Closes an expression: every intermediate is dead, and stack words the
    /// expression left behind are dropped.
    pub fn end_expression(&mut self, out: &mut Writer) {
        self.release_operands();
        for i in 0..self.registers.len() {
            if matches!(self.registers[i].binding, Some(Binding::Intermediate(_))) {
                self.clear(i);
            }
        }
        if let Some(first) = self.spills.first() {
            let count = self.stack_depth - first.position;
            log::warn!("dropping {} stack word(s) left over by an expression", count);
            out.emit(
                Mnemonic::Add,
                vec![Arg::Reg(Reg::Esp), Arg::Reg(Reg::Esp), Arg::Imm(count as i64)],
            );
            self.stack_depth = first.position;
            self.spills.clear();
        }
        self.call_starts.clear();
    }

    // -----------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------

    /// Marks the stack position of a call's first argument.
    ///
    /// Intermediates still waiting for the call to return are pushed first,
    /// so nothing can be spilled in between the arguments later on. The
    /// first argument itself is pinned and stays.
    pub fn begin_call(&mut self, out: &mut Writer) {
        for i in 0..self.registers.len() {
            if !self.pinned.contains(&i)
                && matches!(self.registers[i].binding, Some(Binding::Intermediate(_)))
            {
                self.evict(i, out);
            }
        }
        self.call_starts.push(self.stack_depth);
    }

    /// Accounts for an argument push.
    pub fn record_push(&mut self) {
        self.stack_depth += 1;
    }

    /// The callee pops its own arguments. Fails if a spilled word was pushed
    /// in between them.
    pub fn end_call(&mut self, name: &str, arity: usize) -> Result<(), CodegenError> {
        if arity == 0 {
            return Ok(());
        }
        let start = self
            .call_starts
            .pop()
            .ok_or_else(|| CodegenError::UnmatchedCall(name.to_string()))?;
        if self.spills.iter().any(|s| s.position >= start) {
            return Err(CodegenError::SpillAcrossCall(name.to_string()));
        }
        self.stack_depth = self.stack_depth.saturating_sub(arity);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Flushing
    // -----------------------------------------------------------------

    /// Stores every written variable back to memory. Bindings are kept.
    pub fn store_written(&mut self, out: &mut Writer) {
        self.store_matching(out, |_| true);
    }

    pub fn store_written_globals(&mut self, out: &mut Writer) {
        self.store_matching(out, |v| v.is_global());
    }

    /// Forgets every binding. Written variables must have been stored.
    pub fn invalidate(&mut self) {
        self.pinned.clear();
        for i in 0..self.registers.len() {
            self.clear(i);
        }
    }

    pub fn invalidate_globals(&mut self) {
        for i in 0..self.registers.len() {
            if let Some(Binding::Variable(v)) = &self.registers[i].binding {
                if v.is_global() {
                    self.clear(i);
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Stack frames
    // -----------------------------------------------------------------

    pub fn create_stack_frame(&mut self, frame_size: usize, out: &mut Writer) {
        out.emit_commented(Mnemonic::Push, vec![Arg::Reg(Reg::Ebp)], "stack frame");
        out.emit(Mnemonic::Mov, vec![Arg::Reg(Reg::Ebp), Arg::Reg(Reg::Esp)]);
        if frame_size > 0 {
            out.emit_commented(
                Mnemonic::Sub,
                vec![
                    Arg::Reg(Reg::Esp),
                    Arg::Reg(Reg::Esp),
                    Arg::Imm(frame_size as i64),
                ],
                format!("{} local word(s)", frame_size),
            );
        }
        out.emit(Mnemonic::Pusha, Vec::new());
        self.invalidate();
        self.stack_depth = 0;
        self.spills.clear();
        self.call_starts.clear();
    }

    pub fn destroy_stack_frame(&mut self, out: &mut Writer) {
        out.emit(Mnemonic::Popa, Vec::new());
        out.emit(Mnemonic::Mov, vec![Arg::Reg(Reg::Esp), Arg::Reg(Reg::Ebp)]);
        out.emit(Mnemonic::Pop, vec![Arg::Reg(Reg::Ebp)]);
    }

    /// No value is mirrored by two registers.
    pub fn bindings_are_unique(&self) -> bool {
        let bound: Vec<&Binding> = self
            .registers
            .iter()
            .filter_map(|r| r.binding.as_ref())
            .collect();
        bound
            .iter()
            .enumerate()
            .all(|(i, a)| bound[i + 1..].iter().all(|b| a != b))
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn find(&self, binding: &Binding) -> Option<usize> {
        self.registers
            .iter()
            .position(|r| r.binding.as_ref() == Some(binding))
    }

    fn touch(&mut self, i: usize) {
        self.clock += 1;
        self.registers[i].last_use = self.clock;
    }

    fn pin(&mut self, i: usize) {
        if !self.pinned.contains(&i) {
            self.pinned.push(i);
        }
    }

    fn set_state(&mut self, i: usize, state: RegisterState) {
        let old = self.registers[i].state;
        self.counts[old.index()] -= 1;
        self.counts[state.index()] += 1;
        self.registers[i].state = state;
    }

    fn bind(&mut self, i: usize, binding: Binding, state: RegisterState) {
        self.registers[i].binding = Some(binding);
        self.registers[i].written = false;
        self.set_state(i, state);
        self.touch(i);
    }

    fn clear(&mut self, i: usize) {
        self.registers[i].binding = None;
        self.registers[i].written = false;
        self.set_state(i, RegisterState::Empty);
    }

    /// Picks a victim and evicts whatever it holds: the first empty
    /// register, else the least recently used free one (clean before
    /// written), else the least recently used intermediate.
    fn take_register(&mut self, out: &mut Writer) -> Result<usize, CodegenError> {
        let victim = (0..self.registers.len())
            .filter(|i| !self.pinned.contains(i))
            .min_by_key(|&i| {
                let r = &self.registers[i];
                match r.state {
                    RegisterState::Empty => (0, 0),
                    RegisterState::Free if !r.written => (1, r.last_use),
                    RegisterState::Free => (2, r.last_use),
                    RegisterState::Used => (3, r.last_use),
                }
            })
            .ok_or(CodegenError::NoRegisterAvailable)?;
        self.evict(victim, out);
        Ok(victim)
    }

    fn evict(&mut self, i: usize, out: &mut Writer) {
        let reg = self.registers[i].reg;
        match self.registers[i].binding.clone() {
            Some(Binding::Intermediate(n)) => {
                log::trace!("spilling %{} from {} at depth {}", n, reg, self.stack_depth);
                out.emit_commented(Mnemonic::Push, vec![Arg::Reg(reg)], format!("spill %{}", n));
                self.spills.push(SpillSlot {
                    value: Some(n),
                    position: self.stack_depth,
                });
                self.stack_depth += 1;
            }
            Some(Binding::Variable(v)) if self.registers[i].written => {
                log::trace!("evicting dirty `{}` from {}", v.name, reg);
                out.emit(Mnemonic::Store, vec![location(&v), Arg::Reg(reg)]);
            }
            _ => {}
        }
        self.clear(i);
    }

    /// Brings a spilled intermediate back into a register.
    fn fill(&mut self, n: u32, out: &mut Writer) -> Result<Reg, CodegenError> {
        if !self.spills.iter().any(|s| s.value == Some(n)) {
            return Err(CodegenError::IntermediateNotFound(n));
        }
        // Taking a register may spill again, so locate the slot afterwards.
        let i = self.take_register(out)?;
        let reg = self.registers[i].reg;
        let slot = self
            .spills
            .iter()
            .position(|s| s.value == Some(n))
            .ok_or(CodegenError::IntermediateNotFound(n))?;
        let position = self.spills[slot].position;
        log::trace!("filling %{} into {} from depth {}", n, reg, position);

        if position + 1 == self.stack_depth {
            out.emit_commented(Mnemonic::Pop, vec![Arg::Reg(reg)], format!("fill %{}", n));
            self.spills.remove(slot);
            self.stack_depth -= 1;
        } else {
            let offset = (self.stack_depth - 1 - position) as i64;
            out.emit_commented(
                Mnemonic::Load,
                vec![
                    Arg::Reg(reg),
                    Arg::Mem {
                        base: Reg::Esp,
                        offset,
                    },
                ],
                format!("fill %{}", n),
            );
            self.spills[slot].value = None;
        }
        self.drop_dead_slots(out);

        self.bind(i, Binding::Intermediate(n), RegisterState::Used);
        self.pin(i);
        Ok(reg)
    }

    fn drop_dead_slots(&mut self, out: &mut Writer) {
        let mut count = 0;
        while let Some(top) = self.spills.last() {
            if top.value.is_some() || top.position + 1 != self.stack_depth {
                break;
            }
            self.spills.pop();
            self.stack_depth -= 1;
            count += 1;
        }
        if count > 0 {
            out.emit(
                Mnemonic::Add,
                vec![Arg::Reg(Reg::Esp), Arg::Reg(Reg::Esp), Arg::Imm(count)],
            );
        }
    }

    fn store_matching(&mut self, out: &mut Writer, filter: impl Fn(&Variable) -> bool) {
        for r in self.registers.iter_mut() {
            if !r.written {
                continue;
            }
            if let Some(Binding::Variable(v)) = &r.binding {
                if filter(v) {
                    out.emit(Mnemonic::Store, vec![location(v), Arg::Reg(r.reg)]);
                    r.written = false;
                }
            }
        }
    }
}

/// Memory operand of a scalar variable.
pub fn location(variable: &Variable) -> Arg {
    match &variable.storage {
        Storage::Frame(offset) => Arg::Mem {
            base: Reg::Ebp,
            offset: *offset,
        },
        Storage::Global(name) => Arg::Global(name.clone()),
    }
}
