//! Forward alias analysis: which memory locations may a register hold.

use crate::access_path::ElementFactory;
use crate::environment::ForwardAliasEnvironment;
use crate::ir::{BlockId, Instruction};
use crate::memory_location::MemoryLocationFactory;
use crate::tree::WriteKind;

/// Apply one instruction's alias effect, returning the updated environment.
/// `index` is the instruction's position within `block`, used to key fresh
/// `Instruction`-rooted memory locations.
pub fn apply_instruction(
    env: &ForwardAliasEnvironment,
    instruction: &Instruction,
    block: BlockId,
    index: u32,
    locations: &MemoryLocationFactory,
    elements: &ElementFactory,
) -> ForwardAliasEnvironment {
    let mut env = env.clone();
    match instruction {
        Instruction::LoadParam { dest, index: param } => {
            env.memory_locations.bind_exact(*dest, locations.parameter(*param));
            env.last_parameter_load = env.last_parameter_load.max(*param + 1);
        }
        Instruction::NewInstance { dest, .. } | Instruction::NewArray { dest, .. } => {
            env.memory_locations.bind_exact(*dest, locations.instruction(block, index));
        }
        Instruction::Move { dest, src } => {
            for location in env.memory_locations.locations(*src) {
                env.memory_locations.bind(*dest, location);
            }
        }
        Instruction::IGet { dest, object, field } => {
            let object_locations = env.memory_locations.locations(*object);
            let is_singleton = object_locations.len() == 1;
            for location in &object_locations {
                let field_location = locations.field(location.clone(), field.clone());
                if is_singleton {
                    env.memory_locations.bind_exact(*dest, field_location);
                } else {
                    env.memory_locations.bind(*dest, field_location);
                }
            }
        }
        Instruction::AGet { dest, array } => {
            let array_locations = env.memory_locations.locations(*array);
            let any_index = elements.any_index();
            for location in &array_locations {
                let element_location = locations.intern(crate::memory_location::MemoryLocation::new(
                    location.root().clone(),
                    location.path().with_appended(any_index.clone()),
                ));
                env.memory_locations.bind(*dest, element_location);
            }
        }
        Instruction::IPut { value, object, field } => {
            let object_locations = env.memory_locations.locations(*object);
            let value_locations = env.memory_locations.locations(*value);
            let kind = if object_locations.len() == 1 { WriteKind::Strong } else { WriteKind::Weak };
            for object_location in &object_locations {
                let field_location = locations.field(object_location.clone(), field.clone());
                for value_location in &value_locations {
                    env.points_to.write(field_location.clone(), value_location.clone(), kind);
                }
            }
        }
        Instruction::APut { value, array } => {
            let array_locations = env.memory_locations.locations(*array);
            let value_locations = env.memory_locations.locations(*value);
            let any_index = elements.any_index();
            for array_location in &array_locations {
                let element_location = locations.intern(crate::memory_location::MemoryLocation::new(
                    array_location.root().clone(),
                    array_location.path().with_appended(any_index.clone()),
                ));
                for value_location in &value_locations {
                    env.points_to.write(element_location.clone(), value_location.clone(), WriteKind::Weak);
                }
            }
        }
        Instruction::Invoke { .. } => {
            env.last_invoke_result = Some(locations.instruction(block, index));
        }
        Instruction::MoveResult { dest } => {
            if let Some(result) = env.last_invoke_result.clone() {
                env.memory_locations.bind_exact(*dest, result);
            }
        }
        Instruction::SGet { .. }
        | Instruction::SPut { .. }
        | Instruction::Return { .. }
        | Instruction::Throw { .. } => {}
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Register;

    #[test]
    fn load_param_binds_parameter_location() {
        let locations = MemoryLocationFactory::new();
        let elements = ElementFactory::new();
        let env = ForwardAliasEnvironment::bottom();
        let env = apply_instruction(
            &env,
            &Instruction::LoadParam { dest: Register(0), index: 0 },
            BlockId(0),
            0,
            &locations,
            &elements,
        );
        assert!(env.memory_locations.locations(Register(0)).contains(&locations.parameter(0)));
    }

    #[test]
    fn iget_chains_field_location_from_singleton_object() {
        let locations = MemoryLocationFactory::new();
        let elements = ElementFactory::new();
        let fields: crate::intern::Interner<crate::ir::Field> = crate::intern::Interner::new();
        let field = fields.intern(crate::ir::Field {
            class_name: "A".to_string(),
            name: "x".to_string(),
            field_type: "I".to_string(),
        });
        let mut env = ForwardAliasEnvironment::bottom();
        env.memory_locations.bind_exact(Register(0), locations.this_());
        let env = apply_instruction(
            &env,
            &Instruction::IGet { dest: Register(1), object: Register(0), field: field.clone() },
            BlockId(0),
            1,
            &locations,
            &elements,
        );
        let expected = locations.field(locations.this_(), field);
        assert!(env.memory_locations.locations(Register(1)).contains(&expected));
    }
}
